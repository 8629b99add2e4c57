//! Typed parser for the kernel RAID status table (`/proc/mdstat`).

use anyhow::{bail, ensure, Context, Error};

/// One array line of the status table, e.g.
/// `md0 : active raid10 sdb4[3] sdb3[2] sdb2[1] sdb1[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdArray {
    /// Array id, e.g. `md0`.
    pub name: String,

    /// `active` or `inactive`.
    pub status: String,

    /// RAID personality, e.g. `raid10`. Inactive arrays report none.
    pub level: Option<String>,

    pub members: Vec<MdMember>,
}

impl MdArray {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// Names of the member devices, e.g. `sdb1`.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|member| member.name.as_str())
    }

    pub fn failed_members(&self) -> impl Iterator<Item = &MdMember> {
        self.members.iter().filter(|member| member.is_failed())
    }
}

/// A member device of an array, e.g. `sdb1[0]` or `sdc2[1](F)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdMember {
    pub name: String,

    /// Role number inside the array.
    pub index: u32,

    /// Single-letter flags: `F` failed, `S` spare, `W` write-mostly.
    pub flags: Vec<char>,
}

impl MdMember {
    pub fn is_failed(&self) -> bool {
        self.flags.contains(&'F')
    }
}

/// A line of the status table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MdstatLine {
    Array(MdArray),

    /// Known informational line: `Personalities`, indented continuation
    /// lines, `unused devices` or blank.
    Ignored,
}

/// Parses the full status table, returning only the array lines.
pub fn parse(contents: &str) -> Result<Vec<MdArray>, Error> {
    contents
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match parse_line(line) {
            Ok(MdstatLine::Array(array)) => Some(Ok(array)),
            Ok(MdstatLine::Ignored) => None,
            Err(e) => Some(Err(e.context(format!("Bad RAID status on line {}", index + 1)))),
        })
        .collect()
}

pub fn parse_line(line: &str) -> Result<MdstatLine, Error> {
    if line.trim().is_empty()
        || line.starts_with(char::is_whitespace)
        || line.starts_with("Personalities")
        || line.starts_with("unused devices")
    {
        return Ok(MdstatLine::Ignored);
    }

    let Some((name, rest)) = line.split_once(" : ") else {
        bail!("Unrecognized line '{line}'");
    };
    let name = name.trim();
    ensure!(
        name.starts_with("md") && name.len() > 2,
        "Unrecognized array name '{name}' in line '{line}'"
    );

    let mut tokens = rest.split_whitespace().peekable();
    let status = tokens
        .next()
        .with_context(|| format!("Missing status for array '{name}'"))?
        .to_string();

    // Read-only markers sit between the status and the level
    while tokens.next_if(|token| token.starts_with('(')).is_some() {}

    let level = tokens
        .next_if(|token| !token.contains('['))
        .map(str::to_string);

    let members = tokens
        .map(parse_member)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse members of array '{name}'"))?;

    Ok(MdstatLine::Array(MdArray {
        name: name.to_string(),
        status,
        level,
        members,
    }))
}

fn parse_member(token: &str) -> Result<MdMember, Error> {
    let (name, rest) = token
        .split_once('[')
        .with_context(|| format!("Member '{token}' has no role number"))?;
    let (index, mut flags_str) = rest
        .split_once(']')
        .with_context(|| format!("Member '{token}' has an unterminated role number"))?;
    ensure!(!name.is_empty(), "Member '{token}' has no device name");
    let index = index
        .parse()
        .with_context(|| format!("Member '{token}' has an invalid role number"))?;

    let mut flags = Vec::new();
    while !flags_str.is_empty() {
        let mut chars = flags_str.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some('('), Some(flag), Some(')')) if flag.is_ascii_uppercase() => {
                flags.push(flag);
                flags_str = &flags_str[3..];
            }
            _ => bail!("Member '{token}' has unrecognized flags '{flags_str}'"),
        }
    }

    Ok(MdMember {
        name: name.to_string(),
        index,
        flags,
    })
}
