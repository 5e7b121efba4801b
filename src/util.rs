use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Timelike, Utc};

pub(crate) fn retriable_status(code: u16) -> bool {
    matches!(code, 500 | 502 | 503 | 504 | 429 | 408)
}

/// Appends raw `key=value` pairs. WCS servers expect `subset=lat(1,2)` unescaped.
pub(crate) fn append_query(url: &str, params: &[(&str, &str)]) -> String {
    let mut out = url.to_string();
    if !(url.ends_with('?') || url.ends_with('&')) {
        out.push(if url.contains('?') { '&' } else { '?' });
    }
    let mut first = true;
    for (k, v) in params {
        if !first {
            out.push('&');
        }
        first = false;
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
    out
}

const SECRET_PARAMS: [&str; 2] = ["username", "password"];

/// Hides the key segment of `.../api/<token>/...` urls and the account
/// query parameters of `GetAPIKey` urls.
pub(crate) fn redact_url(url: &str) -> String {
    let marker = "/api/";
    let url = match url.find(marker) {
        Some(idx) => {
            let start = idx + marker.len();
            let rest = &url[start..];
            match rest.find('/') {
                Some(end) => format!("{}***{}", &url[..start], &rest[end..]),
                None => url.to_string(),
            }
        }
        None => url.to_string(),
    };

    let Some((path, query)) = url.split_once('?') else {
        return url;
    };
    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((k, _)) if SECRET_PARAMS.iter().any(|s| k.eq_ignore_ascii_case(s)) => {
                format!("{}=***", k)
            }
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", path, query)
}

pub(crate) fn truncate_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_minute(0))
        .unwrap_or(t)
}

pub(crate) fn hourly_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let mut out = Vec::new();
    let mut t = start;
    while t <= end {
        out.push(t);
        t += ChronoDuration::hours(1);
    }
    out
}

/// `2020-03-24T07:00:00Z`, the form used by WCS time subsets.
pub(crate) fn iso_hour(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub(crate) fn parse_iso_z(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%SZ")
        .ok()
        .map(|n| n.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn append_query_after_trailing_question_mark() {
        let url = append_query(
            "https://h/api/KEY/MF-NWP-HIGHRES-AROME-001-FRANCE-WCS?",
            &[("SERVICE", "WCS"), ("REQUEST", "GetCapabilities")],
        );
        assert_eq!(
            url,
            "https://h/api/KEY/MF-NWP-HIGHRES-AROME-001-FRANCE-WCS?SERVICE=WCS&REQUEST=GetCapabilities"
        );
        assert_eq!(append_query("http://h/p?a=1", &[("b", "2")]), "http://h/p?a=1&b=2");
        assert_eq!(append_query("http://h/p", &[("b", "2")]), "http://h/p?b=2");
    }

    #[test]
    fn redacts_token_segment() {
        assert_eq!(
            redact_url("https://geoservices.meteofrance.fr/api/__abc__/MF-WCS?SERVICE=WCS"),
            "https://geoservices.meteofrance.fr/api/***/MF-WCS?SERVICE=WCS"
        );
        assert_eq!(redact_url("http://localhost/x"), "http://localhost/x");
    }

    #[test]
    fn redacts_account_query_values() {
        assert_eq!(
            redact_url("https://h/services/GetAPIKey?username=jdoe&password=S3CRETPW"),
            "https://h/services/GetAPIKey?username=***&password=***"
        );
        assert_eq!(
            redact_url("https://h/api/__abc__/X?SERVICE=WCS&subset=time(2020-03-24T13:00:00Z)"),
            "https://h/api/***/X?SERVICE=WCS&subset=time(2020-03-24T13:00:00Z)"
        );
    }

    #[test]
    fn hourly_range_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2020, 3, 24, 6, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 3, 24, 9, 0, 0).unwrap();
        let hours = hourly_range(start, end);
        assert_eq!(hours.len(), 4);
        assert_eq!(iso_hour(&hours[3]), "2020-03-24T09:00:00Z");
        assert_eq!(parse_iso_z("2020-03-24T09:00:00Z"), Some(end));
    }

    #[test]
    fn truncation_drops_minutes() {
        let t = Utc.with_ymd_and_hms(2020, 3, 24, 6, 42, 17).unwrap();
        assert_eq!(truncate_to_hour(t), Utc.with_ymd_and_hms(2020, 3, 24, 6, 0, 0).unwrap());
    }
}
