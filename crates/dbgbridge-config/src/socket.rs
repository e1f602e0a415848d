//! Well-known endpoint on which the bridge accepts automation clients.

use std::fmt;
use std::io;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

/// Where the bridge listens.
///
/// The text form is `unix:///path/to/socket` or `tcp://host:port`. Bare
/// absolute paths are accepted as shorthand for a unix socket, and
/// `host:port` as shorthand for TCP.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// Unix domain socket at `path`.
    Unix { path: Utf8PathBuf },
    /// TCP listener on `host:port`. Port `0` asks the OS for a free port.
    Tcp { host: String, port: u16 },
}

impl SocketEndpoint {
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Socket file path for unix endpoints.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        if let Self::Unix { path } = self {
            Some(path)
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_unix(&self) -> bool {
        self.unix_path().is_some()
    }

    /// Creates the socket file's parent directory (mode `0700` on unix).
    ///
    /// An existing parent is left as it is but must be a directory. TCP
    /// endpoints need nothing.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .ok_or_else(|| SocketPreparationError::MissingParent {
                path: path.to_owned(),
            })?;

        if parent.exists() {
            return if parent.is_dir() {
                Ok(())
            } else {
                Err(SocketPreparationError::NotADirectory {
                    path: parent.to_owned(),
                })
            };
        }

        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        std::os::unix::fs::DirBuilderExt::mode(&mut builder, 0o700);
        match builder.create(parent) {
            Err(source) if source.kind() != io::ErrorKind::AlreadyExists => {
                Err(SocketPreparationError::CreateDirectory {
                    path: parent.to_owned(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } if host.contains(':') => {
                write!(formatter, "tcp://[{host}]:{port}")
            }
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.starts_with('/') {
            return Ok(Self::unix(trimmed));
        }
        if !trimmed.contains("://") {
            return parse_tcp(&format!("tcp://{trimmed}"), input);
        }

        let url = Url::parse(trimmed).map_err(|source| SocketParseError::Malformed {
            input: input.to_owned(),
            source,
        })?;
        match url.scheme() {
            "unix" => match url.path() {
                "" | "/" => Err(SocketParseError::MissingUnixPath {
                    input: input.to_owned(),
                }),
                path => Ok(Self::unix(path)),
            },
            "tcp" => parse_tcp(trimmed, input),
            other => Err(SocketParseError::UnsupportedScheme {
                scheme: other.to_owned(),
            }),
        }
    }
}

fn parse_tcp(text: &str, input: &str) -> Result<SocketEndpoint, SocketParseError> {
    let url = Url::parse(text).map_err(|source| SocketParseError::Malformed {
        input: input.to_owned(),
        source,
    })?;
    let host = match url.host() {
        Some(Host::Ipv6(address)) => address.to_string(),
        Some(Host::Ipv4(address)) => address.to_string(),
        Some(Host::Domain(name)) => name.to_owned(),
        None => {
            return Err(SocketParseError::MissingHost {
                input: input.to_owned(),
            });
        }
    };
    let port = url.port().ok_or_else(|| SocketParseError::MissingPort {
        input: input.to_owned(),
    })?;
    Ok(SocketEndpoint::tcp(host, port))
}

/// Errors encountered while parsing a [`SocketEndpoint`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    #[error("unsupported socket scheme '{scheme}'; expected unix or tcp")]
    UnsupportedScheme { scheme: String },
    #[error("missing TCP host in '{input}'")]
    MissingHost { input: String },
    #[error("missing TCP port in '{input}'")]
    MissingPort { input: String },
    #[error("missing unix socket path in '{input}'")]
    MissingUnixPath { input: String },
    #[error("malformed endpoint '{input}': {source}")]
    Malformed {
        input: String,
        #[source]
        source: url::ParseError,
    },
}

/// Errors raised while preparing the socket's directory.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    #[error("socket path '{path}' has no parent directory")]
    MissingParent { path: Utf8PathBuf },
    #[error("socket directory '{path}' exists but is not a directory")]
    NotADirectory { path: Utf8PathBuf },
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("tcp://127.0.0.1:9780", SocketEndpoint::tcp("127.0.0.1", 9780))]
    #[case("tcp://[::1]:9780", SocketEndpoint::tcp("::1", 9780))]
    #[case(
        "unix:///run/user/1000/dbgbridge/dbgbridged.sock",
        SocketEndpoint::unix("/run/user/1000/dbgbridge/dbgbridged.sock")
    )]
    fn canonical_text_round_trips(#[case] input: &str, #[case] expected: SocketEndpoint) {
        let endpoint: SocketEndpoint = input.parse().expect("endpoint should parse");
        assert_eq!(endpoint, expected);
        assert_eq!(endpoint.to_string(), input);
    }

    #[rstest]
    #[case("/tmp/dbgbridged.sock", SocketEndpoint::unix("/tmp/dbgbridged.sock"))]
    #[case("localhost:9780", SocketEndpoint::tcp("localhost", 9780))]
    fn shorthand_forms_parse(#[case] input: &str, #[case] expected: SocketEndpoint) {
        assert_eq!(input.parse::<SocketEndpoint>().ok(), Some(expected));
    }

    #[rstest]
    #[case("pipe://windbgmcp")]
    #[case("tcp://127.0.0.1")]
    #[case("unix://")]
    fn rejects_unusable_endpoints(#[case] input: &str) {
        assert!(input.parse::<SocketEndpoint>().is_err());
    }

    #[test]
    fn creates_missing_parent_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = dir.path().join("nested").join("dbgbridged.sock");
        let socket = Utf8PathBuf::from_path_buf(socket).expect("utf8 temp path");

        SocketEndpoint::unix(socket.clone())
            .prepare_filesystem()
            .expect("prepare socket directory");

        assert!(socket.parent().is_some_and(Utf8Path::is_dir));
    }

    #[test]
    fn refuses_a_file_where_the_directory_should_be() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, b"").expect("write blocker");
        let socket = Utf8PathBuf::from_path_buf(blocker.join("dbgbridged.sock"))
            .expect("utf8 temp path");

        let error = SocketEndpoint::unix(socket)
            .prepare_filesystem()
            .expect_err("file parent should be refused");
        assert!(matches!(error, SocketPreparationError::NotADirectory { .. }));
    }

    #[test]
    fn tcp_endpoints_need_no_preparation() {
        let endpoint = SocketEndpoint::tcp("127.0.0.1", 0);
        assert!(!endpoint.is_unix());
        assert!(endpoint.prepare_filesystem().is_ok());
    }
}
