use crate::{Result, SimError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One package download from the request log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub timestamp: i64,
    /// Anonymized IP address identifying the client
    pub client: String,
    /// Absolute URL path of the package, e.g. `/packages/source/f/foo/foo-1.0.tar.gz`
    pub url: String,
    pub user_agent: String,
}

/// Parse `timestamp,ip_address,url,user_agent` where any field may be quoted
pub fn parse_request(line: &str, line_no: usize) -> Result<RequestRecord> {
    let malformed = |reason: String| SimError::MalformedRecord {
        line: line_no,
        reason,
    };

    let fields = split_csv(line).map_err(&malformed)?;
    let [timestamp, client, url, user_agent]: [String; 4] = fields
        .try_into()
        .map_err(|fields: Vec<String>| malformed(format!("expected 4 fields, got {}", fields.len())))?;

    let timestamp = timestamp
        .trim()
        .parse::<i64>()
        .map_err(|e| malformed(format!("bad timestamp {:?}: {}", timestamp, e)))?;
    if !url.starts_with('/') {
        return Err(malformed(format!("request URL {:?} is not absolute", url)));
    }

    Ok(RequestRecord {
        timestamp,
        client,
        url,
        user_agent,
    })
}

fn split_csv(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            (true, '"') => quoted = false,
            (true, c) => field.push(c),
            (false, '"') if field.is_empty() => quoted = true,
            (false, ',') => fields.push(std::mem::take(&mut field)),
            (false, c) => field.push(c),
        }
    }

    if quoted {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(field);
    Ok(fields)
}

/// Lazily parsed records of a request log, skipping blank lines
pub fn read_requests(path: &Path) -> Result<impl Iterator<Item = Result<RequestRecord>>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SimError::MissingMetadata(path.to_path_buf()),
        _ => e.into(),
    })?;

    Ok(BufReader::new(file)
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(parse_request(line.trim_end_matches('\r'), index + 1)),
            Err(e) => Some(Err(e.into())),
        }))
}
