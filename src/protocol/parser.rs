//! Parser for server metadata returned by `INFO`

use std::fmt;

/// Semantic version reported as `redis_version` in the `# Server` section
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    /// First release accepting a count argument on `LPOP`/`RPOP`.
    pub const POP_COUNT: ServerVersion = ServerVersion::new(6, 2, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        ServerVersion {
            major,
            minor,
            patch,
        }
    }

    /// Whether `LPOP key count` is available as a single command.
    pub fn supports_pop_count(&self) -> bool {
        *self >= Self::POP_COUNT
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

pub struct Parser;

impl Parser {
    /// Extract `redis_version` from an `INFO` payload.
    pub fn parse_version(info: &str) -> Result<ServerVersion, String> {
        let raw = info
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .find_map(|line| line.strip_prefix("redis_version:"))
            .ok_or_else(|| "redis_version missing from INFO reply".to_string())?;

        Self::parse_semver(raw)
    }

    fn parse_semver(raw: &str) -> Result<ServerVersion, String> {
        let mut parts = raw.trim().split('.');
        let mut next = |name: &str| -> Result<u32, String> {
            match parts.next() {
                None => Ok(0),
                Some(part) => {
                    // tolerate suffixes such as "7.2.4-rc1"
                    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
                    digits
                        .parse::<u32>()
                        .map_err(|_| format!("invalid {} component in version \"{}\"", name, raw))
                }
            }
        };

        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;
        Ok(ServerVersion::new(major, minor, patch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "# Server\r\nredis_version:7.2.4\r\nredis_git_sha1:00000000\r\nredis_mode:standalone\r\n";

    #[test]
    fn reads_version_from_server_section() {
        let version = Parser::parse_version(INFO).unwrap();
        assert_eq!(version, ServerVersion::new(7, 2, 4));
        assert!(version.supports_pop_count());
    }

    #[test]
    fn pop_count_starts_at_6_2() {
        assert!(!ServerVersion::new(6, 0, 16).supports_pop_count());
        assert!(!ServerVersion::new(5, 9, 99).supports_pop_count());
        assert!(ServerVersion::new(6, 2, 0).supports_pop_count());
        assert!(ServerVersion::new(10, 0, 0).supports_pop_count());
    }

    #[test]
    fn tolerates_short_and_suffixed_versions() {
        assert_eq!(
            Parser::parse_version("redis_version:7.4-rc2").unwrap(),
            ServerVersion::new(7, 4, 0)
        );
    }

    #[test]
    fn missing_or_garbled_version_is_an_error() {
        assert!(Parser::parse_version("# Server\r\nredis_mode:standalone").is_err());
        assert!(Parser::parse_version("redis_version:abc").is_err());
    }

    #[test]
    fn display_is_dotted() {
        assert_eq!(ServerVersion::new(6, 2, 14).to_string(), "6.2.14");
    }
}
