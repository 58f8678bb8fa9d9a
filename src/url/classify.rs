use crate::url::normalize::normalize_relay_url;
use crate::url::Category;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Classifies a raw relay URL
///
/// The input is normalized first, so `classify(x) == classify(&normalize_relay_url(x))`.
/// Checks run in the following order and the first match wins:
///
/// 1. Malformed: not `ws://`/`wss://`, unparsable, or a domain host without a
///    top-level label of at least two letters
/// 2. Local: `.local` hosts and loopback/private/CGN/link-local/documentation/
///    multicast/reserved/broadcast IP literals
/// 3. Onion: `.onion` hosts
/// 4. API: any path other than `/`
/// 5. ClearOnline: everything else
///
/// # Examples
///
/// ```
/// use relay_atlas::url::{classify, Category};
///
/// assert_eq!(classify("wss://nos.lol"), Category::ClearOnline);
/// assert_eq!(classify("ws://192.168.1.5"), Category::Local);
/// assert_eq!(classify("wss://abc.onion"), Category::Onion);
/// assert_eq!(classify("wss://relay.example.com/filter"), Category::ClearApi);
/// assert_eq!(classify("not-a-url"), Category::Malformed);
/// ```
pub fn classify(raw: &str) -> Category {
    classify_normalized(&normalize_relay_url(raw))
}

fn classify_normalized(url: &str) -> Category {
    if !url.starts_with("ws://") && !url.starts_with("wss://") {
        return Category::Malformed;
    }

    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return Category::Malformed,
    };

    match parsed.host() {
        None => return Category::Malformed,
        Some(Host::Domain(domain)) => {
            if !has_top_level_label(domain) {
                return Category::Malformed;
            }
            if domain.ends_with(".local") {
                return Category::Local;
            }
            if domain.ends_with(".onion") {
                return Category::Onion;
            }
        }
        // IP literals have no top-level label to check
        Some(Host::Ipv4(ip)) => {
            if is_local_ipv4(ip) {
                return Category::Local;
            }
        }
        Some(Host::Ipv6(ip)) => {
            if is_local_ipv6(ip) {
                return Category::Local;
            }
        }
    }

    if has_api_path(parsed.path()) {
        return Category::ClearApi;
    }

    Category::ClearOnline
}

/// Checks that the label after the final dot has at least two ASCII letters
/// and nothing else
fn has_top_level_label(domain: &str) -> bool {
    match domain.rsplit_once('.') {
        Some((_, tld)) => tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()),
        None => false,
    }
}

fn has_api_path(path: &str) -> bool {
    !path.is_empty() && path != "/"
}

/// Returns true if an IPv4 address is not publicly routable
fn is_local_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();

    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_documentation()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_unspecified()
        // RFC6598 carrier-grade NAT, 100.64.0.0/10
        || (a == 100 && (64..=127).contains(&b))
        // 0.0.0.0/8 "this network"
        || a == 0
        // 240.0.0.0/4 reserved
        || a >= 240
}

/// Returns true if an IPv6 address is not publicly routable
fn is_local_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_local_ipv4(mapped);
    }

    let first = ip.segments()[0];

    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
        // 2001:db8::/32 documentation
        || (first == 0x2001 && ip.segments()[1] == 0x0db8)
}
