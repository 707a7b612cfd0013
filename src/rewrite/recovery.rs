//! Forced "not found" recovery.
//!
//! Requests for assets the application does not serve itself (PDFs and
//! similar) reach us through the error page, with the original URL carried
//! in the query behind a marker:
//!
//! ```text
//! http://www.example.com/404.aspx?404;http://www.example.com:80/docs/report.pdf
//!     → http://www.example.com/docs/report.pdf
//! ```
//!
//! Type exceptions decide which of these requests are unwrapped back into
//! the original URL before any rule matching happens.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::rules::model::TypeException;

/// Rewrite `url` according to the type exceptions.
///
/// Every matching subtype re-applies the unwrap to the current URL, so the
/// last successful unwrap wins. No match returns `url` unchanged.
pub fn recover(url: &Url, exceptions: &[TypeException], marker: &str) -> Url {
    let mut current = url.clone();

    for exception in exceptions {
        if !exception.applies_to(current.as_str()) {
            continue;
        }

        for sub_type in &exception.sub_types {
            if !TypeException::sub_type_matches(sub_type, current.as_str()) {
                continue;
            }

            match unwrap_forced_error(&current, marker) {
                Some(recovered) => {
                    tracing::debug!(
                        type_name = %exception.name,
                        sub_type = %sub_type,
                        url = %current,
                        recovered = %recovered,
                        "Recovered forced not-found request"
                    );
                    current = recovered;
                }
                None => {
                    tracing::debug!(
                        type_name = %exception.name,
                        sub_type = %sub_type,
                        url = %current,
                        "Type exception matched but no forced-error URL to recover"
                    );
                }
            }
        }
    }

    current
}

/// Extract the URL carried behind `marker` in the query, without its port.
///
/// The raw query is tried first so escapes inside the carried URL survive;
/// a fully encoded query is decoded only when the raw form does not parse.
/// The carried URL must stay on the host of `url`.
fn unwrap_forced_error(url: &Url, marker: &str) -> Option<Url> {
    let marker = marker.trim_start_matches('?');
    if marker.is_empty() {
        return None;
    }

    let query = url.query()?;
    let mut recovered = match query.strip_prefix(marker).and_then(parse_absolute) {
        Some(u) => u,
        None => {
            let decoded = percent_decode_str(query).decode_utf8_lossy();
            match decoded.strip_prefix(marker) {
                Some(original) => match parse_absolute(original) {
                    Some(u) => u,
                    None => {
                        tracing::warn!(url = %url, "Forced-error query does not carry an absolute URL");
                        return None;
                    }
                },
                None => return None,
            }
        }
    };

    let same_host = match (recovered.host_str(), url.host_str()) {
        (Some(carried), Some(inbound)) => carried.eq_ignore_ascii_case(inbound),
        _ => false,
    };
    if !same_host {
        tracing::warn!(
            url = %url,
            carried = %recovered,
            "Forced-error query points at another host, ignoring"
        );
        return None;
    }

    // Only fails for URLs without a host, excluded above.
    let _ = recovered.set_port(None);
    Some(recovered)
}

fn parse_absolute(s: &str) -> Option<Url> {
    Url::parse(s).ok().filter(|u| !u.cannot_be_a_base() && u.has_host())
}
