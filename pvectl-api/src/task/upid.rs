//! Task identifier (UPID) parsing.
//!
//! ```text
//! UPID:<node>:<pid>:<pstart>:<starttime>:<type>:<id>:<user>:
//!             └ 8 hex ┘└ 8 hex ┘└─ 8 hex ─┘
//! ```
//!
//! The three hex fields have a fixed width, so once the end of the node name
//! is known every separator up to the operation type sits at a known offset.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

use crate::error::UpidError;

/// Literal prefix of every task identifier.
pub const UPID_PREFIX: &str = "UPID:";

const HEX_WIDTH: usize = 8;

/// A parsed task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Upid {
    raw: String,
    node: String,
    pid: u32,
    pstart: u32,
    start_time: u32,
    operation_type: String,
    target_id: String,
    user: String,
}

impl Upid {
    /// Parse an identifier, rejecting anything that does not match the
    /// fixed layout.
    pub fn parse(upid: &str) -> Result<Self, UpidError> {
        let rest = upid
            .strip_prefix(UPID_PREFIX)
            .ok_or_else(|| UpidError::MissingPrefix(upid.to_string()))?;
        if !upid.ends_with(':') || upid.len() == UPID_PREFIX.len() {
            return Err(UpidError::MissingTerminator(upid.to_string()));
        }

        let node_len = rest
            .find(':')
            .ok_or_else(|| UpidError::MissingTerminator(upid.to_string()))?;
        let node = &rest[..node_len];
        if node.is_empty() {
            return Err(empty(upid, "node"));
        }

        // Offsets of the three separators closing the hex fields,
        // relative to the start of `rest`.
        let pid_start = node_len + 1;
        let pstart_start = pid_start + HEX_WIDTH + 1;
        let time_start = pstart_start + HEX_WIDTH + 1;
        let type_start = time_start + HEX_WIDTH + 1;

        let bytes = rest.as_bytes();
        for sep in [pstart_start - 1, time_start - 1, type_start - 1] {
            if bytes.get(sep) != Some(&b':') {
                return Err(UpidError::MisplacedSeparator {
                    upid: upid.to_string(),
                    offset: UPID_PREFIX.len() + sep,
                });
            }
        }

        if type_start >= rest.len() {
            return Err(UpidError::MissingTerminator(upid.to_string()));
        }

        let pid = hex_field(upid, &rest[pid_start..pstart_start - 1], "pid")?;
        let pstart = hex_field(upid, &rest[pstart_start..time_start - 1], "pstart")?;
        let start_time = hex_field(upid, &rest[time_start..type_start - 1], "starttime")?;

        // `<type>:<id>:<user>:` with the trailing colon removed. The target id
        // may itself contain colons, so type is cut from the left and user
        // from the right.
        let tail = &rest[type_start..rest.len() - 1];
        let (operation_type, remainder) = tail
            .split_once(':')
            .ok_or_else(|| UpidError::MissingTerminator(upid.to_string()))?;
        let (target_id, user) = remainder
            .rsplit_once(':')
            .ok_or_else(|| UpidError::MissingTerminator(upid.to_string()))?;

        if operation_type.is_empty() {
            return Err(empty(upid, "type"));
        }
        if user.is_empty() {
            return Err(empty(upid, "user"));
        }

        Ok(Self {
            raw: upid.to_string(),
            node: node.to_string(),
            pid,
            pstart,
            start_time,
            operation_type: operation_type.to_string(),
            target_id: target_id.to_string(),
            user: user.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn pstart(&self) -> u32 {
        self.pstart
    }

    pub fn operation_type(&self) -> &str {
        &self.operation_type
    }

    /// Identifier of the object the task works on (a VM id, storage name, ...).
    /// Empty for node-wide tasks.
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// When the task was started on the server, as encoded in the identifier.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(i64::from(self.start_time), 0).single()
    }
}

fn empty(upid: &str, field: &'static str) -> UpidError {
    UpidError::EmptyField { upid: upid.to_string(), field }
}

fn hex_field(upid: &str, value: &str, field: &'static str) -> Result<u32, UpidError> {
    let bad = || UpidError::BadHexField { upid: upid.to_string(), field };
    if value.len() != HEX_WIDTH || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(bad());
    }
    u32::from_str_radix(value, 16).map_err(|_| bad())
}

impl FromStr for Upid {
    type Err = UpidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Upid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "UPID:pve1:0000A1B2:00C0FFEE:6553F00D:qmstart:100:root@pam:";

    #[test]
    fn test_parse_fields() {
        let upid = Upid::parse(START).expect("valid upid");
        assert_eq!(upid.node(), "pve1");
        assert_eq!(upid.pid(), 0xA1B2);
        assert_eq!(upid.pstart(), 0x00C0FFEE);
        assert_eq!(upid.operation_type(), "qmstart");
        assert_eq!(upid.target_id(), "100");
        assert_eq!(upid.user(), "root@pam");
        assert_eq!(upid.to_string(), START);
        assert_eq!(
            upid.started_at().map(|t| t.timestamp()),
            Some(0x6553F00D)
        );
    }

    #[test]
    fn test_fields_match_documented_offsets() {
        let cases = [
            ("n", "vzdump", "", "backup@pbs!job"),
            ("node-with-long-name.example", "qmigrate", "104", "root@pam"),
            ("pve", "aptupdate", "", "root@pam"),
            ("pve2", "imgcopy", "local-lvm:vm-100-disk-0", "svc@pve!token"),
        ];

        for (node, kind, id, user) in cases {
            let raw = format!("UPID:{}:0012ABCD:0FEDCBA9:65000000:{}:{}:{}:", node, kind, id, user);
            let upid: Upid = raw.parse().expect("well-formed identifier");

            // Node ends at the first colon after the prefix; the hex block
            // spans exactly 27 bytes after it.
            let node_end = UPID_PREFIX.len() + node.len();
            let type_start = node_end + 1 + 3 * (HEX_WIDTH + 1);
            assert_eq!(&raw[UPID_PREFIX.len()..node_end], upid.node());
            assert_eq!(&raw[type_start..type_start + kind.len()], upid.operation_type());
            assert_eq!(upid.node(), node);
            assert_eq!(upid.operation_type(), kind);
            assert_eq!(upid.target_id(), id);
            assert_eq!(upid.user(), user);
        }
    }

    #[test]
    fn test_rejects_missing_prefix() {
        assert!(matches!(
            Upid::parse("pve1:0000A1B2:00C0FFEE:6553F00D:qmstart:100:root@pam:"),
            Err(UpidError::MissingPrefix(_))
        ));
        assert!(matches!(Upid::parse(""), Err(UpidError::MissingPrefix(_))));
    }

    #[test]
    fn test_rejects_missing_terminator() {
        assert!(matches!(
            Upid::parse("UPID:pve1:0000A1B2:00C0FFEE:6553F00D:qmstart:100:root@pam"),
            Err(UpidError::MissingTerminator(_))
        ));
        assert!(matches!(Upid::parse("UPID:"), Err(UpidError::MissingTerminator(_))));
    }

    #[test]
    fn test_rejects_short_hex_fields() {
        // pid is only 4 digits wide, so the separators land in the wrong place
        let err = Upid::parse("UPID:pve1:A1B2:00C0FFEE:6553F00D:qmstart:100:root@pam:").unwrap_err();
        assert!(matches!(err, UpidError::MisplacedSeparator { .. }));
    }

    #[test]
    fn test_rejects_non_hex_digits() {
        let err = Upid::parse("UPID:pve1:0000XYZW:00C0FFEE:6553F00D:qmstart:100:root@pam:").unwrap_err();
        assert_eq!(
            err,
            UpidError::BadHexField {
                upid: "UPID:pve1:0000XYZW:00C0FFEE:6553F00D:qmstart:100:root@pam:".to_string(),
                field: "pid",
            }
        );
    }

    #[test]
    fn test_rejects_truncated_identifier() {
        // Must not slice past the end of the string
        for raw in ["UPID:pve1:", "UPID:pve1:0000A1B2:", "UPID:pve1:0000A1B2:00C0FFEE:6553F00D:"] {
            assert!(Upid::parse(raw).is_err(), "{} should be rejected", raw);
        }
    }

    #[test]
    fn test_rejects_empty_fields() {
        assert!(matches!(
            Upid::parse("UPID::0000A1B2:00C0FFEE:6553F00D:qmstart:100:root@pam:"),
            Err(UpidError::EmptyField { field: "node", .. })
        ));
        assert!(matches!(
            Upid::parse("UPID:pve1:0000A1B2:00C0FFEE:6553F00D::100:root@pam:"),
            Err(UpidError::EmptyField { field: "type", .. })
        ));
        assert!(matches!(
            Upid::parse("UPID:pve1:0000A1B2:00C0FFEE:6553F00D:qmstart:100::"),
            Err(UpidError::EmptyField { field: "user", .. })
        ));
    }
}
