use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::constant::{
    CAPABILITIES_ALWAYS_ENABLED, CAPABILITIES_CONFIGURABLE, CapabilityFlags, ServerStatusFlags,
};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use crate::protocol::response::ErrPayloadBytes;

const MAX_PACKET_SIZE: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct HandshakeFixedFields {
    connection_id: U32LE,
    auth_data_part1: [u8; 8],
    filler: u8,
    capability_flags_lower: U16LE,
    charset: u8,
    status_flags: U16LE,
    capability_flags_upper: U16LE,
    auth_data_len: u8,
}

#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub auth_plugin_data: Vec<u8>,
    pub capability_flags: CapabilityFlags,
    pub charset: u8,
    pub status_flags: ServerStatusFlags,
    pub auth_plugin_name: String,
}

/// Read initial handshake packet from server
pub fn read_initial_handshake(payload: &[u8]) -> Result<InitialHandshake> {
    let (protocol_version, data) = read_int_1(payload)?;
    if protocol_version == 0xFF {
        return Err(ErrPayloadBytes(payload).into());
    }

    let (server_version, data) = read_string_null(data)?;

    let (fixed, rest) =
        HandshakeFixedFields::ref_from_prefix(data).map_err(|_| Error::UnexpectedEof)?;

    let cap_bits = (u32::from(fixed.capability_flags_upper.get()) << 16)
        | u32::from(fixed.capability_flags_lower.get());

    let (_reserved, rest) = read_string_fix(rest, 10)?;

    // The scramble is 20 bytes in total; part 2 carries the remainder plus a NUL
    let auth_data_2_len = usize::from(fixed.auth_data_len).saturating_sub(9).max(12);
    let (auth_data_2, rest) = read_string_fix(rest, auth_data_2_len)?;
    let (_nul, rest) = read_int_1(rest)?;

    let mut auth_plugin_data = Vec::with_capacity(8 + auth_data_2.len());
    auth_plugin_data.extend_from_slice(&fixed.auth_data_part1);
    auth_plugin_data.extend_from_slice(auth_data_2);

    // Some servers omit the trailing NUL of the plugin name
    let auth_plugin_name = match read_string_null(rest) {
        Ok((name, _)) => name,
        Err(_) => rest,
    };

    Ok(InitialHandshake {
        protocol_version,
        server_version: String::from_utf8_lossy(server_version).into_owned(),
        connection_id: fixed.connection_id.get(),
        auth_plugin_data,
        capability_flags: CapabilityFlags::from_bits_truncate(cap_bits),
        charset: fixed.charset,
        status_flags: ServerStatusFlags::from_bits_truncate(fixed.status_flags.get()),
        auth_plugin_name: String::from_utf8_lossy(auth_plugin_name).into_owned(),
    })
}

/// Handshake response packet sent by client (HandshakeResponse41)
#[derive(Debug, Clone)]
pub struct HandshakeResponse41<'a> {
    pub capability_flags: CapabilityFlags,
    pub max_packet_size: u32,
    pub charset: u8,
    pub username: &'a str,
    pub auth_response: &'a [u8],
    pub database: Option<&'a str>,
    pub auth_plugin_name: &'a str,
}

pub fn write_handshake_response(out: &mut Vec<u8>, response: &HandshakeResponse41<'_>) {
    write_int_4(out, response.capability_flags.bits());
    write_int_4(out, response.max_packet_size);
    write_int_1(out, response.charset);
    out.extend_from_slice(&[0u8; 23]);
    write_string_null(out, response.username);

    if response
        .capability_flags
        .contains(CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA)
    {
        write_bytes_lenenc(out, response.auth_response);
    } else {
        write_int_1(out, response.auth_response.len() as u8);
        out.extend_from_slice(response.auth_response);
    }

    if let Some(db) = response.database
        && response
            .capability_flags
            .contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB)
    {
        write_string_null(out, db);
    }

    if response
        .capability_flags
        .contains(CapabilityFlags::CLIENT_PLUGIN_AUTH)
    {
        write_string_null(out, response.auth_plugin_name);
    }
}

/// Auth switch request from server
#[derive(Debug, Clone)]
pub struct AuthSwitchRequest<'a> {
    pub plugin_name: &'a [u8],
    pub plugin_data: &'a [u8],
}

/// Read auth switch request (0xFE followed by plugin name and scramble)
pub fn read_auth_switch_request(payload: &[u8]) -> Result<AuthSwitchRequest<'_>> {
    let (header, data) = read_int_1(payload)?;
    if header != 0xFE {
        return Err(Error::InvalidPacket);
    }
    let (plugin_name, data) = read_string_null(data)?;
    let plugin_data = data.strip_suffix(&[0]).unwrap_or(data);
    Ok(AuthSwitchRequest {
        plugin_name,
        plugin_data,
    })
}

/// mysql_native_password: SHA1(password) XOR SHA1(challenge + SHA1(SHA1(password)))
pub fn auth_mysql_native_password(password: &str, challenge: &[u8]) -> Vec<u8> {
    use sha1::{Digest, Sha1};

    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);

    let mut hasher = Sha1::new();
    hasher.update(challenge);
    hasher.update(stage2);
    let token = hasher.finalize();

    stage1.iter().zip(token.iter()).map(|(a, b)| a ^ b).collect()
}

/// caching_sha2_password: SHA256(password) XOR SHA256(SHA256(SHA256(password)) + challenge)
pub fn auth_caching_sha2_password(password: &str, challenge: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};

    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha256::digest(password.as_bytes());
    let stage2 = Sha256::digest(stage1);

    let mut hasher = Sha256::new();
    hasher.update(stage2);
    hasher.update(challenge);
    let scramble = hasher.finalize();

    stage1.iter().zip(scramble.iter()).map(|(a, b)| a ^ b).collect()
}

fn auth_response_for(plugin: &[u8], password: &str, challenge: &[u8]) -> Result<Vec<u8>> {
    match plugin {
        b"mysql_native_password" => Ok(auth_mysql_native_password(password, challenge)),
        b"caching_sha2_password" => Ok(auth_caching_sha2_password(password, challenge)),
        plugin => Err(Error::UnsupportedAuthPlugin(
            String::from_utf8_lossy(plugin).into_owned(),
        )),
    }
}

/// Configuration for handshake
#[derive(Debug, Clone, Default)]
pub struct HandshakeConfig {
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub capabilities: CapabilityFlags,
    pub charset: u8,
}

/// Result of driving the handshake state machine
#[derive(Debug)]
pub enum HandshakeResult {
    /// Write this payload to the server, then read the next packet
    Write(Vec<u8>),
    /// Nothing to write; read the next packet
    Read,
    /// Handshake complete
    Connected {
        initial_handshake: Box<InitialHandshake>,
        capability_flags: CapabilityFlags,
    },
}

/// State machine for the connection phase
///
/// Pure parsing and packet generation without I/O; the caller feeds it
/// each packet from the server and writes whatever it returns.
#[derive(Debug)]
pub enum Handshake {
    Start {
        config: HandshakeConfig,
    },
    WaitingAuthResult {
        config: HandshakeConfig,
        initial_handshake: Box<InitialHandshake>,
        plugin: Vec<u8>,
        capability_flags: CapabilityFlags,
    },
    Connected,
}

impl Handshake {
    pub fn new(config: HandshakeConfig) -> Self {
        Self::Start { config }
    }

    /// Drive the state machine with the next payload
    pub fn drive(&mut self, payload: &[u8]) -> Result<HandshakeResult> {
        match std::mem::replace(self, Self::Connected) {
            Self::Start { config } => {
                let handshake = read_initial_handshake(payload)?;
                if !handshake
                    .capability_flags
                    .contains(CapabilityFlags::CLIENT_PROTOCOL_41)
                {
                    return Err(Error::BadConfigError(
                        "server does not support protocol 4.1".to_string(),
                    ));
                }

                let mut client_caps =
                    CAPABILITIES_ALWAYS_ENABLED | (config.capabilities & CAPABILITIES_CONFIGURABLE);
                if config.database.is_some() {
                    client_caps |= CapabilityFlags::CLIENT_CONNECT_WITH_DB;
                }
                let capability_flags = client_caps & handshake.capability_flags;

                let plugin = handshake.auth_plugin_name.as_bytes().to_vec();
                let auth_response =
                    auth_response_for(&plugin, &config.password, &handshake.auth_plugin_data)?;

                let mut out = Vec::new();
                write_handshake_response(
                    &mut out,
                    &HandshakeResponse41 {
                        capability_flags,
                        max_packet_size: MAX_PACKET_SIZE,
                        charset: config.charset,
                        username: &config.username,
                        auth_response: &auth_response,
                        database: config.database.as_deref(),
                        auth_plugin_name: &handshake.auth_plugin_name,
                    },
                );

                *self = Self::WaitingAuthResult {
                    config,
                    initial_handshake: Box::new(handshake),
                    plugin,
                    capability_flags,
                };
                Ok(HandshakeResult::Write(out))
            }

            Self::WaitingAuthResult {
                config,
                initial_handshake,
                plugin,
                capability_flags,
            } => match payload.first() {
                Some(0x00) => Ok(HandshakeResult::Connected {
                    initial_handshake,
                    capability_flags,
                }),
                Some(0xFF) => Err(ErrPayloadBytes(payload).into()),
                // caching_sha2_password fast auth result
                Some(0x01) if plugin == b"caching_sha2_password" => match payload.get(1) {
                    Some(0x03) => {
                        *self = Self::WaitingAuthResult {
                            config,
                            initial_handshake,
                            plugin,
                            capability_flags,
                        };
                        Ok(HandshakeResult::Read)
                    }
                    Some(0x04) => Err(Error::UnsupportedAuthPlugin(
                        "caching_sha2_password full authentication requires TLS or RSA"
                            .to_string(),
                    )),
                    _ => Err(Error::InvalidPacket),
                },
                Some(0xFE) => {
                    let switch = read_auth_switch_request(payload)?;
                    let auth_response =
                        auth_response_for(switch.plugin_name, &config.password, switch.plugin_data)?;
                    let plugin = switch.plugin_name.to_vec();
                    *self = Self::WaitingAuthResult {
                        config,
                        initial_handshake,
                        plugin,
                        capability_flags,
                    };
                    Ok(HandshakeResult::Write(auth_response))
                }
                _ => Err(Error::InvalidPacket),
            },

            Self::Connected => Err(Error::LibraryBug(color_eyre::eyre::eyre!(
                "handshake driven after it completed"
            ))),
        }
    }
}
