//! A single, uniform percent-encoder used for both query strings and
//! `application/x-www-form-urlencoded` bodies: every byte outside
//! `[A-Za-z0-9._~-]` becomes an uppercase `%HH` triplet. No `+` for space —
//! that's a `www-form` convention this crate deliberately does not
//! special-case.

const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789._~-";

/// Percent-encode every byte of `input` outside the unreserved set.
pub fn encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.as_bytes() {
        if UNRESERVED.contains(byte) {
            out.push(*byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Percent-decode a query or form value: `%HH` becomes the corresponding
/// byte, `+` becomes a space, everything else passes through unchanged. The
/// input is assumed to be a valid UTF-8 string once decoded; invalid
/// sequences are replaced per [`String::from_utf8_lossy`].
pub fn decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let decoded = if i + 2 < bytes.len() {
                    std::str::from_utf8(&bytes[i + 1..i + 3])
                        .ok()
                        .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                } else {
                    None
                };
                match decoded {
                    Some(value) => {
                        out.push(value);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Build an `application/x-www-form-urlencoded` body from ordered pairs,
/// using [`encode`] for both keys and values, joined with `&`/`=`.
pub fn form_encode(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Parse a query string (the part after `?`, without leading `?`) into
/// decoded key/value pairs. Pairs without an `=` get an empty value.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    if query.is_empty() {
        return Vec::new();
    }
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode(k), decode(v)),
            None => (decode(pair), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_uses_uppercase_hex_no_plus() {
        assert_eq!(encode("a b"), "a%20b");
        assert_eq!(encode("rust!"), "rust%21");
        assert_eq!(encode("A-Za-z0-9._~-"), "A-Za-z0-9._~-");
    }

    #[test]
    fn decode_handles_plus_and_percent() {
        assert_eq!(decode("a+b"), "a b");
        assert_eq!(decode("a%20b"), "a b");
        assert_eq!(decode("100%25"), "100%");
    }

    #[test]
    fn decode_of_encode_is_identity_on_arbitrary_bytes() {
        let input = "hello world!@#$%^&*()_+{}[]日本語";
        assert_eq!(decode(&encode(input)), input);
    }

    #[test]
    fn encode_of_decode_is_identity_on_unreserved_set() {
        let input = "AZaz09._~-";
        assert_eq!(encode(&decode(input)), input);
    }

    #[test]
    fn parse_query_splits_pairs() {
        let pairs = parse_query("code=C&state=S+1");
        assert_eq!(
            pairs,
            vec![("code".to_string(), "C".to_string()), ("state".to_string(), "S 1".to_string())]
        );
    }
}
