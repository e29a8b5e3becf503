//! TLS upgrade for MySQL sessions.
//!
//! # Handshake Flow
//!
//! 1. Server greeting advertises `CLIENT_SSL`
//! 2. Client sends the SSL request (see `handshake::build_ssl_request`)
//! 3. Client runs the TLS handshake on the same socket
//! 4. The handshake response and everything after it travel encrypted
//!
//! Verification follows the MySQL client modes:
//! - `Preferred` / `Required`: encrypt only, the certificate is not checked
//! - `VerifyCa`: the chain must lead to a trusted root; the host name is ignored
//! - `VerifyIdentity`: chain and host name are checked
//!
//! Trusted roots are the configured CA file, or the webpki bundle when none
//! is set. The stream itself needs the `tls` feature.

use sqlwire_core::Result;

use crate::config::{SslMode, TlsConfig};
use crate::errors::ssl_error;

/// Check a TLS configuration before any bytes are exchanged.
pub fn validate_tls_config(ssl_mode: SslMode, tls_config: &TlsConfig) -> Result<()> {
    if !ssl_mode.should_try_ssl() {
        return Ok(());
    }
    match (&tls_config.client_cert_path, &tls_config.client_key_path) {
        (Some(_), None) => Err(ssl_error(
            "client certificate provided without client key; both are needed for mutual TLS",
        )),
        (None, Some(_)) => Err(ssl_error(
            "client key provided without client certificate; both are needed for mutual TLS",
        )),
        _ => Ok(()),
    }
}

#[cfg(feature = "tls")]
pub use stream::TlsStream;

#[cfg(feature = "tls")]
mod stream {
    use std::fs::File;
    use std::io::{self, BufReader, Read, Write};
    use std::path::Path;
    use std::sync::Arc;

    use rustls::client::WebPkiServerVerifier;
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::CryptoProvider;
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
    use sqlwire_core::Result;

    use crate::config::{SslMode, TlsConfig};
    use crate::errors::ssl_error;

    /// A stream wrapped in a rustls client session.
    pub struct TlsStream<S: Read + Write> {
        conn: rustls::ClientConnection,
        stream: S,
    }

    impl<S: Read + Write> std::fmt::Debug for TlsStream<S> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("TlsStream")
                .field("protocol_version", &self.conn.protocol_version())
                .field("is_handshaking", &self.conn.is_handshaking())
                .finish_non_exhaustive()
        }
    }

    impl<S: Read + Write> TlsStream<S> {
        /// Run the TLS handshake over an already connected stream.
        pub fn connect(mut stream: S, tls_config: &TlsConfig, ssl_mode: SslMode, server_name: &str) -> Result<Self> {
            let config = build_client_config(tls_config, ssl_mode)?;
            let name = ServerName::try_from(server_name.to_string())
                .map_err(|e| ssl_error(format!("invalid TLS server name '{}': {}", server_name, e)))?;
            let mut conn = rustls::ClientConnection::new(Arc::new(config), name)
                .map_err(|e| ssl_error(format!("failed to create TLS session: {}", e)))?;

            while conn.is_handshaking() {
                while conn.wants_write() {
                    conn.write_tls(&mut stream)
                        .map_err(|e| ssl_error(format!("TLS handshake write failed: {}", e)))?;
                }
                if conn.wants_read() {
                    let read = conn
                        .read_tls(&mut stream)
                        .map_err(|e| ssl_error(format!("TLS handshake read failed: {}", e)))?;
                    if read == 0 {
                        return Err(ssl_error("server closed the connection during the TLS handshake"));
                    }
                    conn.process_new_packets()
                        .map_err(|e| ssl_error(format!("TLS handshake failed: {}", e)))?;
                }
            }

            tracing::debug!(
                protocol = ?conn.protocol_version(),
                cipher = ?conn.negotiated_cipher_suite().map(|s| s.suite()),
                ?ssl_mode,
                "TLS session established"
            );
            Ok(Self { conn, stream })
        }

        pub fn get_mut(&mut self) -> &mut S {
            &mut self.stream
        }

        pub fn protocol_version(&self) -> Option<rustls::ProtocolVersion> {
            self.conn.protocol_version()
        }
    }

    impl<S: Read + Write> Read for TlsStream<S> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            loop {
                match self.conn.reader().read(buf) {
                    Ok(n) if n > 0 => return Ok(n),
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e),
                }
                if !self.conn.wants_read() {
                    return Ok(0);
                }
                if self.conn.read_tls(&mut self.stream)? == 0 {
                    return Ok(0);
                }
                self.conn
                    .process_new_packets()
                    .map_err(|e| io::Error::other(format!("TLS error: {}", e)))?;
            }
        }
    }

    impl<S: Read + Write> Write for TlsStream<S> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = self.conn.writer().write(buf)?;
            while self.conn.wants_write() {
                self.conn.write_tls(&mut self.stream)?;
            }
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.conn.writer().flush()?;
            while self.conn.wants_write() {
                self.conn.write_tls(&mut self.stream)?;
            }
            self.stream.flush()
        }
    }

    /// Accepts any certificate. Used for encrypt-only modes.
    #[derive(Debug)]
    struct NoVerifier(Arc<CryptoProvider>);

    impl ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> std::result::Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.0.signature_verification_algorithms.supported_schemes()
        }
    }

    /// Full chain verification that tolerates a host name mismatch.
    #[derive(Debug)]
    struct ChainOnlyVerifier(Arc<WebPkiServerVerifier>);

    fn is_name_mismatch(err: &CertificateError) -> bool {
        matches!(err, CertificateError::NotValidForName)
            || format!("{:?}", err).starts_with("NotValidForName")
    }

    impl ServerCertVerifier for ChainOnlyVerifier {
        fn verify_server_cert(
            &self,
            end_entity: &CertificateDer<'_>,
            intermediates: &[CertificateDer<'_>],
            server_name: &ServerName<'_>,
            ocsp_response: &[u8],
            now: UnixTime,
        ) -> std::result::Result<ServerCertVerified, rustls::Error> {
            match self
                .0
                .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            {
                Err(rustls::Error::InvalidCertificate(err)) if is_name_mismatch(&err) => {
                    Ok(ServerCertVerified::assertion())
                }
                other => other,
            }
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            self.0.verify_tls12_signature(message, cert, dss)
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            self.0.verify_tls13_signature(message, cert, dss)
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.0.supported_verify_schemes()
        }
    }

    fn build_client_config(tls_config: &TlsConfig, ssl_mode: SslMode) -> Result<rustls::ClientConfig> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])
            .map_err(|e| ssl_error(format!("failed to set TLS versions: {}", e)))?;

        let verifier: Arc<dyn ServerCertVerifier> = match ssl_mode {
            SslMode::Disable => return Err(ssl_error("TLS requested with ssl_mode disabled")),
            _ if tls_config.danger_skip_verify => Arc::new(NoVerifier(provider.clone())),
            SslMode::Preferred | SslMode::Required => Arc::new(NoVerifier(provider.clone())),
            SslMode::VerifyCa | SslMode::VerifyIdentity => {
                let roots = Arc::new(load_roots(tls_config)?);
                let webpki = WebPkiServerVerifier::builder_with_provider(roots, provider.clone())
                    .build()
                    .map_err(|e| ssl_error(format!("failed to build certificate verifier: {}", e)))?;
                if ssl_mode == SslMode::VerifyCa {
                    Arc::new(ChainOnlyVerifier(webpki)) as Arc<dyn ServerCertVerifier>
                } else {
                    webpki as Arc<dyn ServerCertVerifier>
                }
            }
        };

        let builder = builder
            .dangerous()
            .with_custom_certificate_verifier(verifier);

        match (&tls_config.client_cert_path, &tls_config.client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let certs = load_certs(cert_path)?;
                let mut reader = BufReader::new(open(key_path)?);
                let key = rustls_pemfile::private_key(&mut reader)
                    .map_err(|e| ssl_error(format!("failed to parse client key: {}", e)))?
                    .ok_or_else(|| ssl_error(format!("no private key found in '{}'", key_path.display())))?;
                builder
                    .with_client_auth_cert(certs, key)
                    .map_err(|e| ssl_error(format!("failed to configure client auth: {}", e)))
            }
            _ => Ok(builder.with_no_client_auth()),
        }
    }

    fn open(path: &Path) -> Result<File> {
        File::open(path).map_err(|e| ssl_error(format!("failed to open '{}': {}", path.display(), e)))
    }

    fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
        let mut reader = BufReader::new(open(path)?);
        let certs = rustls_pemfile::certs(&mut reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ssl_error(format!("failed to parse certificates in '{}': {}", path.display(), e)))?;
        if certs.is_empty() {
            return Err(ssl_error(format!("no certificates found in '{}'", path.display())));
        }
        Ok(certs)
    }

    fn load_roots(tls_config: &TlsConfig) -> Result<RootCertStore> {
        let mut roots = RootCertStore::empty();
        match &tls_config.ca_cert_path {
            Some(path) => {
                for cert in load_certs(path)? {
                    roots
                        .add(cert)
                        .map_err(|e| ssl_error(format!("failed to add CA certificate: {}", e)))?;
                }
            }
            None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
        }
        Ok(roots)
    }
}
