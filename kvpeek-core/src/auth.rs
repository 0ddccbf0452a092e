//! SASL authentication: PLAIN and SCRAM-SHA1/256/512.
//!
//! PLAIN is used on TLS connections. On plain connections the strongest
//! SCRAM mechanism the server advertises is chosen, and PLAIN is only used
//! when the server offers nothing else.
//!
//! # Security
//! - The password only ever reaches PBKDF2 or the PLAIN payload buffer,
//!   both of which are zeroized
//! - The server signature of a SCRAM exchange is verified before the
//!   connection is considered authenticated

use crate::cluster::connection::KvConnection;
use crate::protocol::{Opcode, Request, Status};
use crate::security::Credentials;
use crate::{KvPeekError, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

/// Supported SASL mechanisms, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Mechanism {
    Plain,
    ScramSha1,
    ScramSha256,
    ScramSha512,
}

impl Mechanism {
    pub fn name(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha1 => "SCRAM-SHA1",
            Self::ScramSha256 => "SCRAM-SHA256",
            Self::ScramSha512 => "SCRAM-SHA512",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "PLAIN" => Some(Self::Plain),
            "SCRAM-SHA1" => Some(Self::ScramSha1),
            "SCRAM-SHA256" => Some(Self::ScramSha256),
            "SCRAM-SHA512" => Some(Self::ScramSha512),
            _ => None,
        }
    }

    /// Picks a mechanism from the server's space-separated list.
    pub fn select(advertised: &str, tls: bool) -> Result<Self> {
        let offered: Vec<Self> = advertised
            .split_whitespace()
            .filter_map(Self::from_name)
            .collect();

        if tls && offered.contains(&Self::Plain) {
            return Ok(Self::Plain);
        }

        offered.iter().copied().max().ok_or_else(|| {
            KvPeekError::authentication(format!(
                "No supported SASL mechanism offered (server offered: {})",
                advertised.trim()
            ))
        })
    }

    fn scram_hash(self) -> Option<ScramHash> {
        match self {
            Self::Plain => None,
            Self::ScramSha1 => Some(ScramHash::Sha1),
            Self::ScramSha256 => Some(ScramHash::Sha256),
            Self::ScramSha512 => Some(ScramHash::Sha512),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScramHash {
    Sha1,
    Sha256,
    Sha512,
}

impl ScramHash {
    fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Sha1 => mac::<Hmac<Sha1>>(key, data),
            Self::Sha256 => mac::<Hmac<Sha256>>(key, data),
            Self::Sha512 => mac::<Hmac<Sha512>>(key, data),
        }
    }

    fn hash(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    fn salted_password(self, password: &str, salt: &[u8], rounds: u32) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(vec![0u8; self.output_len()]);
        match self {
            Self::Sha1 => pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, rounds, &mut out),
            Self::Sha256 => {
                pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut out)
            }
            Self::Sha512 => {
                pbkdf2::pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, rounds, &mut out)
            }
        }
        out
    }
}

fn mac<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = <M as KeyInit>::new_from_slice(key)
        .map_err(|_| KvPeekError::authentication("Invalid HMAC key length"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Builds the PLAIN payload `\0username\0password`.
pub(crate) fn plain_payload(credentials: &Credentials) -> Zeroizing<Vec<u8>> {
    let mut payload = Zeroizing::new(Vec::with_capacity(
        credentials.username().len() + credentials.password().len() + 2,
    ));
    payload.push(0);
    payload.extend_from_slice(credentials.username().as_bytes());
    payload.push(0);
    payload.extend_from_slice(credentials.password().as_bytes());
    payload
}

/// Client side of a SCRAM exchange (RFC 5802).
pub struct ScramClient {
    hash: ScramHash,
    password: Zeroizing<String>,
    client_nonce: String,
    client_first_bare: String,
    server_signature: Option<Vec<u8>>,
}

impl ScramClient {
    pub fn new(mechanism: Mechanism, credentials: &Credentials) -> Result<Self> {
        let nonce = STANDARD.encode(rand::random::<[u8; 24]>());
        Self::with_nonce(mechanism, credentials, nonce)
    }

    pub(crate) fn with_nonce(
        mechanism: Mechanism,
        credentials: &Credentials,
        client_nonce: String,
    ) -> Result<Self> {
        let hash = mechanism.scram_hash().ok_or_else(|| {
            KvPeekError::authentication(format!("{} is not a SCRAM mechanism", mechanism.name()))
        })?;
        let client_first_bare = format!(
            "n={},r={}",
            escape_username(credentials.username()),
            client_nonce
        );
        Ok(Self {
            hash,
            password: Zeroizing::new(credentials.password().to_string()),
            client_nonce,
            client_first_bare,
            server_signature: None,
        })
    }

    /// The client-first message, with the `n,,` GS2 header.
    pub fn client_first(&self) -> String {
        format!("n,,{}", self.client_first_bare)
    }

    /// Consumes the server-first message and returns the client-final message.
    pub fn handle_server_first(&mut self, server_first: &str) -> Result<String> {
        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for attr in server_first.split(',') {
            match attr.split_once('=') {
                Some(("r", v)) => nonce = Some(v),
                Some(("s", v)) => salt = Some(v),
                Some(("i", v)) => iterations = Some(v),
                Some(("e", v)) => {
                    return Err(KvPeekError::authentication(format!("Server rejected SCRAM: {}", v)));
                }
                Some(("m", _)) => {
                    return Err(KvPeekError::authentication(
                        "Server requires an unsupported SCRAM extension",
                    ));
                }
                _ => {}
            }
        }

        let nonce = nonce
            .ok_or_else(|| KvPeekError::authentication("SCRAM server-first is missing the nonce"))?;
        if !nonce.starts_with(&self.client_nonce) || nonce.len() == self.client_nonce.len() {
            return Err(KvPeekError::authentication(
                "SCRAM server nonce does not extend the client nonce",
            ));
        }
        let salt = STANDARD
            .decode(salt.ok_or_else(|| KvPeekError::authentication("SCRAM server-first is missing the salt"))?)
            .map_err(|_| KvPeekError::authentication("SCRAM salt is not valid base64"))?;
        let iterations = iterations
            .and_then(|i| i.parse::<u32>().ok())
            .filter(|i| *i > 0)
            .ok_or_else(|| KvPeekError::authentication("SCRAM iteration count is missing or invalid"))?;

        let salted = self.hash.salted_password(&self.password, &salt, iterations);
        let client_key = Zeroizing::new(self.hash.hmac(&salted, b"Client Key")?);
        let stored_key = self.hash.hash(&client_key);
        let server_key = self.hash.hmac(&salted, b"Server Key")?;

        let without_proof = format!("c=biws,r={}", nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare, server_first, without_proof
        );

        let client_signature = self.hash.hmac(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();
        self.server_signature = Some(self.hash.hmac(&server_key, auth_message.as_bytes())?);

        Ok(format!("{},p={}", without_proof, STANDARD.encode(proof)))
    }

    /// Checks the server-final message against the expected server signature.
    pub fn verify_server_final(&self, server_final: &str) -> Result<()> {
        let expected = self.server_signature.as_ref().ok_or_else(|| {
            KvPeekError::authentication("SCRAM server-final received before server-first")
        })?;

        for attr in server_final.split(',') {
            match attr.split_once('=') {
                Some(("e", v)) => {
                    return Err(KvPeekError::authentication(format!("Server rejected SCRAM: {}", v)));
                }
                Some(("v", v)) => {
                    let signature = STANDARD.decode(v).map_err(|_| {
                        KvPeekError::authentication("SCRAM server signature is not valid base64")
                    })?;
                    if &signature == expected {
                        return Ok(());
                    }
                    return Err(KvPeekError::authentication(
                        "SCRAM server signature mismatch",
                    ));
                }
                _ => {}
            }
        }

        Err(KvPeekError::authentication(
            "SCRAM server-final is missing the server signature",
        ))
    }
}

fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

/// Runs SASL on a freshly opened connection.
pub(crate) async fn authenticate(
    conn: &mut KvConnection,
    credentials: &Credentials,
    tls: bool,
) -> Result<Mechanism> {
    let response = conn.execute(Request::new(Opcode::SaslListMechs)).await?;
    if !response.status.is_success() {
        return Err(response.into_error("SASL_LIST_MECHS"));
    }
    let advertised = String::from_utf8_lossy(&response.value).into_owned();
    let mechanism = Mechanism::select(&advertised, tls)?;
    tracing::debug!("Authenticating to {} with {}", conn.address(), mechanism.name());

    match mechanism {
        Mechanism::Plain => {
            if !tls {
                tracing::warn!(
                    "Server {} only offers PLAIN; the password is sent unencrypted",
                    conn.address()
                );
            }
            let payload = plain_payload(credentials);
            let response = conn
                .execute(
                    Request::new(Opcode::SaslAuth)
                        .with_key(Bytes::from_static(b"PLAIN"))
                        .with_value(Bytes::copy_from_slice(&payload)),
                )
                .await?;
            check_auth_status(response.status, credentials)?;
        }
        scram => {
            let mut client = ScramClient::new(scram, credentials)?;
            let response = conn
                .execute(
                    Request::new(Opcode::SaslAuth)
                        .with_key(Bytes::from_static(scram.name().as_bytes()))
                        .with_value(Bytes::from(client.client_first())),
                )
                .await?;
            if response.status != Status::AuthContinue {
                check_auth_status(response.status, credentials)?;
                return Err(KvPeekError::authentication(
                    "Server finished SCRAM without a challenge",
                ));
            }

            let server_first = String::from_utf8_lossy(&response.value).into_owned();
            let client_final = client.handle_server_first(&server_first)?;
            let response = conn
                .execute(
                    Request::new(Opcode::SaslStep)
                        .with_key(Bytes::from_static(scram.name().as_bytes()))
                        .with_value(Bytes::from(client_final)),
                )
                .await?;
            check_auth_status(response.status, credentials)?;
            client.verify_server_final(&String::from_utf8_lossy(&response.value))?;
        }
    }

    Ok(mechanism)
}

fn check_auth_status(status: Status, credentials: &Credentials) -> Result<()> {
    match status {
        Status::Success => Ok(()),
        Status::AuthError => Err(KvPeekError::authentication(format!(
            "Invalid credentials for user '{}'",
            credentials.username()
        ))),
        other => Err(KvPeekError::authentication(format!(
            "Unexpected SASL status {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pencil() -> Credentials {
        Credentials::new("user".to_string(), "pencil".to_string())
    }

    #[test]
    fn test_mechanism_selection() {
        let offered = "SCRAM-SHA512 SCRAM-SHA256 SCRAM-SHA1 PLAIN";
        assert_eq!(Mechanism::select(offered, false).unwrap(), Mechanism::ScramSha512);
        assert_eq!(Mechanism::select(offered, true).unwrap(), Mechanism::Plain);
        assert_eq!(
            Mechanism::select("SCRAM-SHA1 SCRAM-SHA256", true).unwrap(),
            Mechanism::ScramSha256
        );
        assert_eq!(Mechanism::select("PLAIN", false).unwrap(), Mechanism::Plain);
        assert!(Mechanism::select("GSSAPI", false).is_err());
        assert!(Mechanism::select("", true).is_err());
    }

    #[test]
    fn test_plain_payload() {
        let payload = plain_payload(&Credentials::new("a".to_string(), "b".to_string()));
        assert_eq!(payload.as_slice(), b"\0a\0b");
    }

    #[test]
    fn test_scram_sha1_rfc5802_vector() {
        let mut client = ScramClient::with_nonce(
            Mechanism::ScramSha1,
            &pencil(),
            "fyko+d2lbbFgONRv9qkxdawL".to_string(),
        )
        .unwrap();
        assert_eq!(client.client_first(), "n,,n=user,r=fyko+d2lbbFgONRv9qkxdawL");

        let client_final = client
            .handle_server_first(
                "r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096",
            )
            .unwrap();
        assert_eq!(
            client_final,
            "c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts="
        );
        client
            .verify_server_final("v=rmF9pqV8S7suAoZWja4dJRkFsKQ=")
            .unwrap();
    }

    #[test]
    fn test_scram_sha256_rfc7677_vector() {
        let mut client = ScramClient::with_nonce(
            Mechanism::ScramSha256,
            &pencil(),
            "rOprNGfwEbeRWgbNEkqO".to_string(),
        )
        .unwrap();

        let client_final = client
            .handle_server_first(
                "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096",
            )
            .unwrap();
        assert_eq!(
            client_final,
            "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
        );
        client
            .verify_server_final("v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=")
            .unwrap();
        assert!(
            client
                .verify_server_final("v=AAAATRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=")
                .is_err()
        );
    }

    #[test]
    fn test_scram_sha512_exchange() {
        let mut client = ScramClient::with_nonce(
            Mechanism::ScramSha512,
            &pencil(),
            "rOprNGfwEbeRWgbNEkqO".to_string(),
        )
        .unwrap();

        let client_final = client
            .handle_server_first(
                "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096",
            )
            .unwrap();
        assert!(client_final.ends_with(
            "p=gMGXRcevScNtxZ6/8lQYpGtnsNAc3mGcmNomv+xnoOMw+3R2xNJdMNnzMlTN8PPC6wdp6dybEmDYXYTxwnYPJQ=="
        ));
        client
            .verify_server_final(
                "v=ZQnYEgWQMFmmsM8aQMF0nDDCy/AgCzkwk8CmMZYcMg0vSVlKDanekLtifDSeVGT4+5ZxXnJq199RVG2rR7N7Zw==",
            )
            .unwrap();
    }

    #[test]
    fn test_scram_rejects_foreign_nonce() {
        let mut client =
            ScramClient::with_nonce(Mechanism::ScramSha256, &pencil(), "abc".to_string()).unwrap();
        assert!(client.handle_server_first("r=xyz123,s=QSXCR+Q6sek8bf92,i=4096").is_err());
        assert!(client.handle_server_first("r=abc,s=QSXCR+Q6sek8bf92,i=4096").is_err());
        assert!(client.handle_server_first("r=abcdef,s=QSXCR+Q6sek8bf92,i=0").is_err());
        assert!(client.handle_server_first("e=other-error").is_err());
    }

    #[test]
    fn test_scram_username_escaping() {
        let creds = Credentials::new("a=b,c".to_string(), "pw".to_string());
        let client =
            ScramClient::with_nonce(Mechanism::ScramSha1, &creds, "n0nce".to_string()).unwrap();
        assert_eq!(client.client_first(), "n,,n=a=3Db=2Cc,r=n0nce");
    }

    #[test]
    fn test_plain_is_not_scram() {
        assert!(ScramClient::new(Mechanism::Plain, &pencil()).is_err());
    }

    #[test]
    fn test_auth_failure_never_mentions_password() {
        let creds = Credentials::new("admin".to_string(), "hunter2".to_string());
        let err = check_auth_status(Status::AuthError, &creds).unwrap_err();
        assert!(err.to_string().contains("admin"));
        assert!(!err.to_string().contains("hunter2"));
    }
}
