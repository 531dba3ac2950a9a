use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::instrument;

use crate::config::TorAuth;

const SERVER_TO_CONTROLLER_KEY: &[u8] = b"Tor safe cookie authentication server-to-controller hash";
const CONTROLLER_TO_SERVER_KEY: &[u8] = b"Tor safe cookie authentication controller-to-server hash";
const NONCE_LEN: usize = 32;
const OK: u16 = 250;

type HmacSha256 = Hmac<Sha256>;

/// Client for Tor's control port.
#[derive(Clone, Debug)]
pub(crate) struct TorController {
    pub(crate) address: String,
    pub(crate) auth: TorAuth,
}

#[derive(Debug, PartialEq, Eq)]
struct Reply {
    code: u16,
    lines: Vec<String>,
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TorController {
    /// Asks Tor for fresh circuits, which changes the exit address.
    #[instrument(skip(self), err, fields(address = %self.address))]
    pub(crate) async fn renew_identity(&self) -> Result<()> {
        let mut connection = Connection::open(&self.address).await?;
        connection.authenticate(&self.auth).await?;
        connection.command("SIGNAL NEWNYM").await?;
        // Tor closes the socket on QUIT; its reply is informational.
        let _ = connection.command("QUIT").await;
        Ok(())
    }
}

impl Connection {
    async fn open(address: &str) -> Result<Self> {
        let stream = TcpStream::connect(address)
            .await
            .with_context(|| format!("Couldn't connect to Tor control port {address}"))?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer,
        })
    }

    async fn authenticate(&mut self, auth: &TorAuth) -> Result<()> {
        match auth {
            TorAuth::Null => {
                self.command("AUTHENTICATE").await?;
            }
            TorAuth::Password { password } => {
                self.command(&format!("AUTHENTICATE {}", quote(password))).await?;
            }
            TorAuth::Cookie { cookie_file } => {
                let cookie = read_cookie(cookie_file).await?;
                self.command(&format!("AUTHENTICATE {}", hex::encode(cookie))).await?;
            }
            TorAuth::SafeCookie { cookie_file } => {
                let cookie = read_cookie(cookie_file).await?;
                let mut client_nonce = [0u8; NONCE_LEN];
                rand::thread_rng().fill_bytes(&mut client_nonce);

                let reply = self
                    .command(&format!("AUTHCHALLENGE SAFECOOKIE {}", hex::encode(client_nonce)))
                    .await?;
                let challenge = reply.lines.first().map(String::as_str).unwrap_or_default();
                let server_hash = hex::decode(challenge_field(challenge, "SERVERHASH")?)?;
                let server_nonce = hex::decode(challenge_field(challenge, "SERVERNONCE")?)?;

                let mut expected = safe_cookie_mac(SERVER_TO_CONTROLLER_KEY, &cookie, &client_nonce, &server_nonce)?;
                expected
                    .verify_slice(&server_hash)
                    .map_err(|_| anyhow::anyhow!("Tor SERVERHASH did not match the cookie"))?;
                expected = safe_cookie_mac(CONTROLLER_TO_SERVER_KEY, &cookie, &client_nonce, &server_nonce)?;
                let client_hash = expected.finalize().into_bytes();

                self.command(&format!("AUTHENTICATE {}", hex::encode(client_hash)))
                    .await?;
            }
        }
        Ok(())
    }

    async fn command(&mut self, command: &str) -> Result<Reply> {
        tracing::trace!(command = command.split(' ').next().unwrap_or_default(), "Tor control command");
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;

        let reply = self.read_reply().await?;
        anyhow::ensure!(
            reply.code == OK,
            "Tor control port answered {} {}",
            reply.code,
            reply.lines.join(" / ")
        );
        Ok(reply)
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line).await?;
            anyhow::ensure!(read > 0, "Tor control port closed the connection");
            let line = line.trim_end_matches(['\r', '\n']);
            let (code, separator, text) = split_reply_line(line)?;
            lines.push(text.to_string());
            if separator == ' ' {
                return Ok(Reply { code, lines });
            }
        }
    }
}

fn split_reply_line(line: &str) -> Result<(u16, char, &str)> {
    anyhow::ensure!(line.len() >= 4 && line.is_char_boundary(4), "Malformed Tor reply line \"{line}\"");
    let code = line[..3]
        .parse::<u16>()
        .with_context(|| format!("Malformed Tor reply code in \"{line}\""))?;
    let separator = line[3..4].chars().next().unwrap_or(' ');
    anyhow::ensure!(
        matches!(separator, ' ' | '-' | '+'),
        "Malformed Tor reply separator in \"{line}\""
    );
    Ok((code, separator, &line[4..]))
}

fn challenge_field<'a>(challenge: &'a str, key: &str) -> Result<&'a str> {
    challenge
        .split_whitespace()
        .find_map(|part| part.strip_prefix(key).and_then(|rest| rest.strip_prefix('=')))
        .with_context(|| format!("Tor AUTHCHALLENGE reply is missing {key}"))
}

fn safe_cookie_mac(key: &[u8], cookie: &[u8], client_nonce: &[u8], server_nonce: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(cookie);
    mac.update(client_nonce);
    mac.update(server_nonce);
    Ok(mac)
}

async fn read_cookie(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Couldn't read Tor cookie file {}", path.display()))
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
