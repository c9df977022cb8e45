mod handshake;

pub use handshake::AuthSwitchRequest;
pub use handshake::Handshake;
pub use handshake::HandshakeConfig;
pub use handshake::HandshakeResponse41;
pub use handshake::HandshakeResult;
pub use handshake::InitialHandshake;
