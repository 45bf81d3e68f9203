use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use wbak_config::{PASSWORD_LEN, PROJECT_SUFFIX_LEN};

pub type ProjectName = String;

const STAMP_LEN: usize = 14;
const NAME_TIME_FORMAT: &str = "%Y%m%d%H%M%S";
const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SUFFIX_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectNameError {
    #[error("project name `{0}` has no `_` separator")]
    MissingSeparator(String),
    #[error("project name `{0}` does not start with a YYYYMMDDHHMMSS timestamp")]
    BadTimestamp(String),
    #[error("project name `{0}` has an empty id segment")]
    EmptyId(String),
}

/// Identity of one backup job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: ProjectName,
    pub id: String,
    pub created_at: NaiveDateTime,
    pub user: String,
    pub password: String,
}

impl Project {
    pub fn new(
        name: &str,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ProjectNameError> {
        let (created_at, id) = parse_name(name)?;
        Ok(Self {
            name: name.to_string(),
            id,
            created_at,
            user: user.into(),
            password: password.into(),
        })
    }

    /// Creation time as shown to operators, e.g. `2019-03-01 12:30:00`.
    pub fn created_label(&self) -> String {
        self.created_at.format(DISPLAY_TIME_FORMAT).to_string()
    }

    /// First and last eight characters of the user directory name.
    pub fn user_label(&self) -> String {
        let chars: Vec<char> = self.user.chars().collect();
        if chars.len() <= 16 {
            return self.user.clone();
        }
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 8..].iter().collect();
        format!("{head}...{tail}")
    }
}

/// Builds a fresh `YYYYMMDDHHMMSS_xxxx` project name for the given local time.
pub fn generate_name(now: NaiveDateTime) -> ProjectName {
    format!("{}_{}", now.format(NAME_TIME_FORMAT), random_suffix())
}

fn random_suffix() -> String {
    let mut n = uuid::Uuid::new_v4().as_u128();
    (0..PROJECT_SUFFIX_LEN)
        .map(|_| {
            let c = SUFFIX_ALPHABET[(n % 36) as usize] as char;
            n /= 36;
            c
        })
        .collect()
}

/// Splits a project name into its creation timestamp and id segment.
pub fn parse_name(name: &str) -> Result<(NaiveDateTime, String), ProjectNameError> {
    let (stamp, id) = name
        .split_once('_')
        .ok_or_else(|| ProjectNameError::MissingSeparator(name.to_string()))?;
    if id.is_empty() {
        return Err(ProjectNameError::EmptyId(name.to_string()));
    }
    let created_at =
        parse_stamp(stamp).ok_or_else(|| ProjectNameError::BadTimestamp(name.to_string()))?;
    Ok((created_at, id.to_string()))
}

fn parse_stamp(stamp: &str) -> Option<NaiveDateTime> {
    if stamp.len() != STAMP_LEN || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| stamp[range].parse::<u32>().ok();
    let year = stamp[0..4].parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?.and_hms_opt(
        field(8..10)?,
        field(10..12)?,
        field(12..14)?,
    )
}

/// Database password: first hex characters of MD5(IMEI ∥ UIN), empty unless both are known.
pub fn derive_password(imei: &str, uin: &str) -> String {
    if imei.is_empty() || uin.is_empty() {
        return String::new();
    }
    let mut ctx = md5::Context::new();
    ctx.consume(imei.as_bytes());
    ctx.consume(uin.as_bytes());
    let hex = format!("{:x}", ctx.finalize());
    hex[..PASSWORD_LEN].to_string()
}
