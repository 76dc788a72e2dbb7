//! Switch line grammar
//!
//! Every switch occupies exactly one line. Surrounding whitespace is ignored, everything else
//! must match one of the forms below in full:
//!
//! ```text
//! -u<FROM>:<TO>    remap uid FROM to TO (decimal)
//! -g<FROM>:<TO>    remap gid FROM to TO (decimal)
//! -f<PATH>         read more switches from PATH, one per line
//! --dry-run        report what would change without touching anything
//! --verbose        print one line per remapped entry
//! ```
//!
//! # Examples
//!
//! ```
//! use common::switch::Switch;
//!
//! assert_eq!(
//!     Switch::parse("  -u1000:2000 ").unwrap(),
//!     Switch::UidRemap { from: 1000, to: 2000 }
//! );
//! assert!(Switch::parse("-u1000").is_err());
//! ```

use enum_map::Enum;
use std::path::PathBuf;

use crate::args::ParseError;

/// Which half of the ownership pair an id belongs to
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Enum)]
pub enum IdKind {
    Uid,
    Gid,
}

impl IdKind {
    /// Name of the owner class, used in "won't remap root ..." messages
    pub fn owner_name(self) -> &'static str {
        match self {
            IdKind::Uid => "user",
            IdKind::Gid => "group",
        }
    }
}

impl std::fmt::Display for IdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            IdKind::Uid => write!(f, "uid"),
            IdKind::Gid => write!(f, "gid"),
        }
    }
}

/// A single decoded switch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Switch {
    UidRemap { from: u32, to: u32 },
    GidRemap { from: u32, to: u32 },
    /// path is kept verbatim, it may be empty
    IncludeFile(PathBuf),
    DryRun,
    Verbose,
}

impl Switch {
    /// Decode one line into a switch.
    ///
    /// Only the syntax and the numeric range of ids are checked here, rules that depend on
    /// previously seen switches (root ids, duplicates) belong to the table builder.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let leading_trimmed = line.trim_start_matches(|c: char| c.is_ascii_whitespace());
        // the include path is everything after "-f", trailing whitespace included
        if let Some(path) = leading_trimmed.strip_prefix("-f") {
            return Ok(Switch::IncludeFile(PathBuf::from(path)));
        }
        let trimmed = leading_trimmed.trim_end_matches(|c: char| c.is_ascii_whitespace());
        if let Some(body) = trimmed.strip_prefix("-u") {
            let (from, to) = parse_remap(IdKind::Uid, body, line)?;
            return Ok(Switch::UidRemap { from, to });
        }
        if let Some(body) = trimmed.strip_prefix("-g") {
            let (from, to) = parse_remap(IdKind::Gid, body, line)?;
            return Ok(Switch::GidRemap { from, to });
        }
        match trimmed {
            "--dry-run" => Ok(Switch::DryRun),
            "--verbose" => Ok(Switch::Verbose),
            _ => Err(ParseError::Syntax(line.to_string())),
        }
    }
}

fn is_decimal(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn parse_remap(kind: IdKind, body: &str, line: &str) -> Result<(u32, u32), ParseError> {
    match body.split_once(':') {
        Some((from, to)) if is_decimal(from) && is_decimal(to) => {
            Ok((parse_id(kind, from)?, parse_id(kind, to)?))
        }
        _ => Err(ParseError::Syntax(line.to_string())),
    }
}

fn parse_id(kind: IdKind, digits: &str) -> Result<u32, ParseError> {
    // u32::MAX is (uid_t)-1 which chown(2) reads as "leave unchanged"
    match digits.parse::<u32>() {
        Ok(id) if id != u32::MAX => Ok(id),
        _ => Err(ParseError::IdOutOfRange {
            kind,
            value: digits.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uid_and_gid_remaps() {
        assert_eq!(
            Switch::parse("-u100:150").unwrap(),
            Switch::UidRemap { from: 100, to: 150 }
        );
        assert_eq!(
            Switch::parse("-g200:250").unwrap(),
            Switch::GidRemap { from: 200, to: 250 }
        );
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(
            Switch::parse(" \t-u1:2  ").unwrap(),
            Switch::UidRemap { from: 1, to: 2 }
        );
        assert_eq!(Switch::parse("  --dry-run\t").unwrap(), Switch::DryRun);
        assert_eq!(Switch::parse("--verbose ").unwrap(), Switch::Verbose);
    }

    #[test]
    fn zero_ids_are_syntactically_valid() {
        // root checks happen when the remap is added to the table
        assert_eq!(
            Switch::parse("-u0:5").unwrap(),
            Switch::UidRemap { from: 0, to: 5 }
        );
    }

    #[test]
    fn include_path_is_kept_verbatim() {
        assert_eq!(
            Switch::parse("-f/etc/uremap.args").unwrap(),
            Switch::IncludeFile(PathBuf::from("/etc/uremap.args"))
        );
        assert_eq!(
            Switch::parse("  -fwith space ").unwrap(),
            Switch::IncludeFile(PathBuf::from("with space "))
        );
        assert_eq!(
            Switch::parse("-f").unwrap(),
            Switch::IncludeFile(PathBuf::new())
        );
    }

    #[test]
    fn malformed_lines_are_syntax_errors() {
        for line in [
            "-u5",
            "-u5:",
            "-u:5",
            "-ux:1",
            "-u1:2:3",
            "-u-1:2",
            "-u+1:2",
            "-U1:2",
            "u1:2",
            "-u 1:2",
            "--dry",
            "--dry-run=yes",
            "--VERBOSE",
            "-x",
        ] {
            match Switch::parse(line) {
                Err(ParseError::Syntax(offending)) => assert_eq!(offending, line),
                other => panic!("expected syntax error for {:?}, got {:?}", line, other),
            }
        }
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        match Switch::parse("-u99999999999:1") {
            Err(ParseError::IdOutOfRange { kind, value }) => {
                assert_eq!(kind, IdKind::Uid);
                assert_eq!(value, "99999999999");
            }
            other => panic!("expected out of range error, got {:?}", other),
        }
        // (gid_t)-1
        assert!(matches!(
            Switch::parse("-g1:4294967295"),
            Err(ParseError::IdOutOfRange {
                kind: IdKind::Gid,
                ..
            })
        ));
        assert_eq!(
            Switch::parse("-g1:4294967294").unwrap(),
            Switch::GidRemap {
                from: 1,
                to: 4294967294
            }
        );
    }

    #[test]
    fn id_kind_names() {
        assert_eq!(IdKind::Uid.to_string(), "uid");
        assert_eq!(IdKind::Gid.to_string(), "gid");
        assert_eq!(IdKind::Uid.owner_name(), "user");
        assert_eq!(IdKind::Gid.owner_name(), "group");
    }
}
