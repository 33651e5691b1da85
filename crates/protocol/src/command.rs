//! The wire command record itself (`spec.md` §3, §4.1).

use std::sync::OnceLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rustc_hash::FxHashMap;

use crate::action::{Action, Compression, FileType, TransmissionType, parse_enum};
use crate::error::Error;
use crate::wire::{escape_semicolons, sanitize_control_codes, split_pairs};

/// The reserved numeric OSC prefix this engine's frames are tunnelled under.
pub const OSC_PREFIX: &str = "5113";

/// A single tagged key-value command exchanged between the engine and the
/// remote program it is transmitting files with or from.
///
/// Field order is significant: it is the order fields are considered for
/// serialization (`spec.md` §3's table, top to bottom).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileTransferCommand {
    /// `ac` — what this command asks the engine to do.
    pub action: Action,
    /// `zip` — compression applied to `data`.
    pub compression: Compression,
    /// `ft` — the kind of filesystem entry a `file` command describes.
    pub ftype: FileType,
    /// `tt` — whole-file vs rsync-delta transfer for a regular file.
    pub ttype: TransmissionType,
    /// `id` — the session this command belongs to.
    pub id: String,
    /// `fid` — the file this command addresses within the session.
    pub file_id: String,
    /// `pw` — confirmation bypass token, base64-encoded on the wire.
    pub bypass: String,
    /// `q` — quiet level (0 = acks+errors, 1 = errors only, 2 = silent).
    pub quiet: i64,
    /// `mod` — modification time in nanoseconds since the epoch.
    pub mtime: i64,
    /// `prm` — POSIX permission bits.
    pub permissions: i64,
    /// `sz` — file size in bytes.
    pub size: i64,
    /// `n` — file path, base64-encoded on the wire.
    pub name: String,
    /// `st` — status message or internal walker node id, base64-encoded.
    pub status: String,
    /// `pr` — parent node id (metadata walker) or link-target field.
    pub parent: String,
    /// `d` — payload bytes, always base64-encoded.
    pub data: Vec<u8>,
}

impl Default for FileTransferCommand {
    fn default() -> Self {
        Self {
            action: Action::invalid,
            compression: Compression::none,
            ftype: FileType::regular,
            ttype: TransmissionType::simple,
            id: String::new(),
            file_id: String::new(),
            bypass: String::new(),
            quiet: 0,
            mtime: -1,
            permissions: -1,
            size: -1,
            name: String::new(),
            status: String::new(),
            parent: String::new(),
            data: Vec::new(),
        }
    }
}

#[derive(Clone, Copy)]
enum Field {
    Action,
    Compression,
    Ftype,
    Ttype,
    Id,
    FileId,
    Bypass,
    Quiet,
    Mtime,
    Permissions,
    Size,
    Name,
    Status,
    Parent,
    Data,
}

fn field_map() -> &'static FxHashMap<&'static str, Field> {
    static MAP: OnceLock<FxHashMap<&'static str, Field>> = OnceLock::new();
    MAP.get_or_init(|| {
        [
            ("ac", Field::Action),
            ("zip", Field::Compression),
            ("ft", Field::Ftype),
            ("tt", Field::Ttype),
            ("id", Field::Id),
            ("fid", Field::FileId),
            ("pw", Field::Bypass),
            ("q", Field::Quiet),
            ("mod", Field::Mtime),
            ("prm", Field::Permissions),
            ("sz", Field::Size),
            ("n", Field::Name),
            ("st", Field::Status),
            ("pr", Field::Parent),
            ("d", Field::Data),
        ]
        .into_iter()
        .collect()
    })
}

fn parse_i64(field: &'static str, value: &str) -> Result<i64, Error> {
    value
        .parse()
        .map_err(|_| Error::invalid(field, format!("{value:?} is not a decimal integer")))
}

fn decode_base64_string(field: &'static str, value: &str) -> Result<String, Error> {
    let bytes = BASE64
        .decode(value)
        .map_err(|e| Error::invalid(field, format!("invalid base64: {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::invalid(field, format!("invalid utf-8: {e}")))
}

impl FileTransferCommand {
    /// Serializes this command as `key=value;key=value;…`, omitting any
    /// field whose value equals [`FileTransferCommand::default`]'s.
    ///
    /// When `with_osc_prefix` is set the reserved OSC numeric code and a `;`
    /// are emitted first (`spec.md` §4.1, §6.1).
    #[must_use]
    pub fn serialize(&self, with_osc_prefix: bool) -> String {
        let default = Self::default();
        let mut out = String::new();
        let mut found = false;

        if with_osc_prefix {
            out.push_str(OSC_PREFIX);
            found = true;
        }

        macro_rules! emit {
            ($key:literal, $value:expr) => {
                if found {
                    out.push(';');
                } else {
                    found = true;
                }
                out.push_str($key);
                out.push('=');
                out.push_str(&$value);
            };
        }

        if self.action != default.action {
            emit!("ac", self.action.as_str().to_string());
        }
        if self.compression != default.compression {
            emit!("zip", self.compression.as_str().to_string());
        }
        if self.ftype != default.ftype {
            emit!("ft", self.ftype.as_str().to_string());
        }
        if self.ttype != default.ttype {
            emit!("tt", self.ttype.as_str().to_string());
        }
        if self.id != default.id {
            emit!("id", escape_semicolons(&sanitize_control_codes(&self.id)));
        }
        if self.file_id != default.file_id {
            emit!(
                "fid",
                escape_semicolons(&sanitize_control_codes(&self.file_id))
            );
        }
        if self.bypass != default.bypass {
            emit!("pw", BASE64.encode(self.bypass.as_bytes()));
        }
        if self.quiet != default.quiet {
            emit!("q", self.quiet.to_string());
        }
        if self.mtime != default.mtime {
            emit!("mod", self.mtime.to_string());
        }
        if self.permissions != default.permissions {
            emit!("prm", self.permissions.to_string());
        }
        if self.size != default.size {
            emit!("sz", self.size.to_string());
        }
        if self.name != default.name {
            emit!("n", BASE64.encode(self.name.as_bytes()));
        }
        if self.status != default.status {
            emit!("st", BASE64.encode(self.status.as_bytes()));
        }
        if self.parent != default.parent {
            emit!(
                "pr",
                escape_semicolons(&sanitize_control_codes(&self.parent))
            );
        }
        if self.data != default.data {
            emit!("d", BASE64.encode(&self.data));
        }

        out
    }

    /// Parses a `key=value;key=value;…` command body (without any OSC
    /// prefix — the host strips that before handing bytes to the engine).
    ///
    /// Unknown keys are ignored for forward compatibility. A field with a
    /// value that does not match its declared encoding fails the whole
    /// parse with [`Error::InvalidField`]; a command with no valid action
    /// fails with [`Error::MissingAction`].
    ///
    /// # Errors
    ///
    /// See above.
    pub fn deserialize(data: &str) -> Result<Self, Error> {
        let mut ans = Self::default();
        let map = field_map();

        for pair in split_pairs(data) {
            let Some(&field) = map.get(pair.key.as_str()) else {
                continue;
            };
            match field {
                Field::Action => ans.action = parse_enum("ac", &pair.value)?,
                Field::Compression => ans.compression = parse_enum("zip", &pair.value)?,
                Field::Ftype => ans.ftype = parse_enum("ft", &pair.value)?,
                Field::Ttype => ans.ttype = parse_enum("tt", &pair.value)?,
                Field::Id => ans.id = pair.value,
                Field::FileId => ans.file_id = pair.value,
                Field::Bypass => ans.bypass = decode_base64_string("pw", &pair.value)?,
                Field::Quiet => ans.quiet = parse_i64("q", &pair.value)?,
                Field::Mtime => ans.mtime = parse_i64("mod", &pair.value)?,
                Field::Permissions => ans.permissions = parse_i64("prm", &pair.value)?,
                Field::Size => ans.size = parse_i64("sz", &pair.value)?,
                Field::Name => ans.name = decode_base64_string("n", &pair.value)?,
                Field::Status => ans.status = decode_base64_string("st", &pair.value)?,
                Field::Parent => ans.parent = pair.value,
                Field::Data => {
                    ans.data = BASE64
                        .decode(&pair.value)
                        .map_err(|e| Error::invalid("d", format!("invalid base64: {e}")))?;
                }
            }
        }

        if ans.action == Action::invalid {
            return Err(Error::MissingAction);
        }

        Ok(ans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_elision_emits_only_action() {
        let cmd = FileTransferCommand {
            action: Action::send,
            ..Default::default()
        };
        assert_eq!(cmd.serialize(false), "ac=send");
    }

    #[test]
    fn osc_prefix_is_prepended() {
        let cmd = FileTransferCommand {
            action: Action::send,
            ..Default::default()
        };
        assert_eq!(cmd.serialize(true), format!("{OSC_PREFIX};ac=send"));
    }

    #[test]
    fn round_trips_a_representative_command() {
        let cmd = FileTransferCommand {
            action: Action::file,
            compression: Compression::zlib,
            ftype: FileType::regular,
            ttype: TransmissionType::rsync,
            id: "session-1".to_string(),
            file_id: "f1".to_string(),
            bypass: "secret".to_string(),
            quiet: 1,
            mtime: 1_700_000_000_000_000_000,
            permissions: 0o644,
            size: 1234,
            name: "/tmp/hello.txt".to_string(),
            status: "OK".to_string(),
            parent: "0".to_string(),
            data: b"payload".to_vec(),
        };
        let wire = cmd.serialize(false);
        let parsed = FileTransferCommand::deserialize(&wire).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn round_trips_literal_semicolons_in_plain_string_fields() {
        let cmd = FileTransferCommand {
            action: Action::file,
            id: "a;b;;c".to_string(),
            parent: "x;y".to_string(),
            ..Default::default()
        };
        let wire = cmd.serialize(false);
        let parsed = FileTransferCommand::deserialize(&wire).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let parsed = FileTransferCommand::deserialize("ac=send;bogus=1;id=42").unwrap();
        assert_eq!(parsed.action, Action::send);
        assert_eq!(parsed.id, "42");
    }

    #[test]
    fn missing_action_is_rejected() {
        let err = FileTransferCommand::deserialize("id=1").unwrap_err();
        assert_eq!(err, Error::MissingAction);
    }

    #[test]
    fn invalid_enum_value_is_rejected() {
        let err = FileTransferCommand::deserialize("ac=send;ft=bogus").unwrap_err();
        assert!(matches!(err, Error::InvalidField { field: "ft", .. }));
    }

    #[test]
    fn invalid_integer_is_rejected() {
        let err = FileTransferCommand::deserialize("ac=send;sz=notanumber").unwrap_err();
        assert!(matches!(err, Error::InvalidField { field: "sz", .. }));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let err = FileTransferCommand::deserialize("ac=send;n=not_base64!!").unwrap_err();
        assert!(matches!(err, Error::InvalidField { field: "n", .. }));
    }

    #[test]
    fn base64_fields_round_trip_binary_looking_names() {
        let cmd = FileTransferCommand {
            action: Action::status,
            name: "/home/user/résumé.txt".to_string(),
            status: "EINVAL:bad name".to_string(),
            ..Default::default()
        };
        let wire = cmd.serialize(false);
        let parsed = FileTransferCommand::deserialize(&wire).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn sanitizes_control_codes_at_serialize_time_only() {
        let cmd = FileTransferCommand {
            action: Action::send,
            id: "a\u{0007}b".to_string(),
            ..Default::default()
        };
        assert_eq!(cmd.serialize(false), "ac=send;id=ab");
    }
}
