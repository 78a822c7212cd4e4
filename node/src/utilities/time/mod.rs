use chrono::{TimeZone, Utc};

pub struct NodeTime;

impl NodeTime {
    /// RFC3339 rendering of a unix timestamp given in seconds. Falls back to the epoch for
    /// values chrono can't represent.
    pub fn rfc3339_from_secs(secs: u64) -> String {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX);
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or_default()
            .to_rfc3339()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rfc3339_from_secs() {
        assert_eq!(NodeTime::rfc3339_from_secs(0), "1970-01-01T00:00:00+00:00");
        assert_eq!(
            NodeTime::rfc3339_from_secs(1_600_000_000),
            "2020-09-13T12:26:40+00:00"
        );
    }
}
