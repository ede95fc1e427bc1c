//! Topic filter matching.

/// Whether `topic` is matched by the subscription `filter`.
///
/// An exact byte match always succeeds. Otherwise filter and topic are walked
/// in lock-step: `+` consumes one topic level and `#` consumes the rest of the
/// topic. A `#` that is not the final filter level is not special-cased, so
/// such a filter only ever matches its own literal text.
///
/// ```rust
/// use libshadow::network::application::mqtt::topic::matches;
///
/// assert!(matches("a/+/c", "a/b/c"));
/// assert!(matches("a/#", "a/b/c"));
/// assert!(!matches("a/+", "a/b/c"));
/// ```
pub fn matches(filter: &str, topic: &str) -> bool {
    filter == topic || wildcard_match(filter.as_bytes(), topic.as_bytes())
}

fn wildcard_match(filter: &[u8], topic: &[u8]) -> bool {
    let mut f = 0;
    let mut t = 0;

    while f < filter.len() && t < topic.len() {
        let fc = filter[f];
        let tc = topic[t];
        if tc == b'/' && fc != b'/' {
            break;
        }
        if fc != b'+' && fc != b'#' && fc != tc {
            break;
        }
        if fc == b'+' {
            while t + 1 < topic.len() && topic[t + 1] != b'/' {
                t += 1;
            }
        } else if fc == b'#' {
            t = topic.len() - 1;
        }
        f += 1;
        t += 1;
    }

    t == topic.len() && f == filter.len()
}

#[cfg(test)]
mod tests {
    use super::matches;

    #[test]
    fn exact() {
        assert!(matches("sdk/Test", "sdk/Test"));
        assert!(!matches("sdk/Test", "sdk/Tes"));
        assert!(!matches("sdk/Tes", "sdk/Test"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(matches("a/+/c", "a/b/c"));
        assert!(matches("a/+/c", "a/bbb/c"));
        assert!(matches("+/b", "a/b"));
        assert!(matches("a/+", "a/b"));
        assert!(!matches("a/+", "a/b/c"));
        assert!(!matches("a/+/c", "a/b/d"));
        assert!(!matches("a/+/c", "a//c"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(matches("a/#", "a/b/c"));
        assert!(matches("a/#", "a/b"));
        assert!(matches("#", "a/b/c"));
        assert!(!matches("a/#", "b/c"));
        assert!(!matches("a/#", "a"));
    }

    #[test]
    fn non_terminal_hash_is_literal() {
        assert!(matches("a/#/b", "a/#/b"));
        assert!(!matches("a/#/b", "a/x/b"));
        assert!(!matches("a/#/b", "a/x/y/b"));
    }

    #[test]
    fn shadow_topics() {
        assert!(matches("things/+/shadow/update/delta", "things/lamp/shadow/update/delta"));
        assert!(!matches(
            "things/lamp/shadow/get/accepted",
            "things/lamp/shadow/get/rejected"
        ));
    }
}
