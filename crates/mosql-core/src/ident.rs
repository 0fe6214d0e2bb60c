//! Destination identifier rules.
//!
//! Table and column names are derived from source collection and field names
//! with a snake-case transform. The transform is idempotent and its output
//! is restricted to `[a-z0-9_]`.

/// Convert `s` to snake_case.
///
/// Already-conforming input (only lowercase letters, digits and
/// underscores) is returned unchanged. Otherwise uppercase letters are
/// lowered with an underscore inserted before them, any character outside
/// `[a-z0-9_]` becomes an underscore, and runs of underscores collapse.
pub fn snake_case(s: &str) -> String {
    if is_snake(s) {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else {
            out.push('_');
        }
    }

    collapse_underscores(&out)
}

fn is_snake(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn collapse_underscores(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_underscore = false;
    for c in s.chars() {
        if c == '_' {
            if !prev_underscore {
                out.push(c);
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_becomes_snake() {
        assert_eq!(snake_case("userName"), "user_name");
        assert_eq!(snake_case("communicationChannels"), "communication_channels");
    }

    #[test]
    fn initialisms_split_per_letter() {
        assert_eq!(snake_case("HTTPServer"), "h_t_t_p_server");
    }

    #[test]
    fn already_snake_is_unchanged() {
        assert_eq!(snake_case("already_snake"), "already_snake");
        assert_eq!(snake_case("users2"), "users2");
    }

    #[test]
    fn underscore_runs_collapse() {
        assert_eq!(snake_case("A__B"), "a_b");
    }

    #[test]
    fn dotted_paths_become_single_identifiers() {
        assert_eq!(
            snake_case("attributes.communicationChannels.email"),
            "attributes_communication_channels_email"
        );
    }

    #[test]
    fn output_alphabet_and_idempotence() {
        for input in ["userName", "HTTPServer", "A__B", "a.b-c d", "Mixed_Case99"] {
            let once = snake_case(input);
            assert!(
                once.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
                "{once:?} contains characters outside [a-z0-9_]"
            );
            assert_eq!(snake_case(&once), once, "not idempotent for {input:?}");
        }
    }
}
