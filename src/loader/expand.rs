// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Variable expansion for configuration values.
//!
//! `${NAME}` references are replaced from the loader's environment source.
//! `${HOSTNAME}` falls back to the machine's host name when the variable is
//! not set, so `common_name: ${HOSTNAME}.example.com` works under systemd,
//! which does not export it.

/// Expand `${VAR}` references in `input` using `lookup`.
///
/// Unknown variables and unterminated `${` are left unchanged.
///
/// # Examples
///
/// ```
/// use vault_cert_agent::loader::expand_variables;
///
/// let lookup = |name: &str| (name == "ENV").then(|| "prod".to_string());
/// assert_eq!(expand_variables("web.${ENV}.example.com", lookup), "web.prod.example.com");
/// assert_eq!(expand_variables("${MISSING}", lookup), "${MISSING}");
/// ```
pub fn expand_variables(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = input.to_string();
    let mut start = 0;

    while let Some(var_start) = result[start..].find("${") {
        let absolute_start = start + var_start;

        let Some(var_end) = result[absolute_start..].find('}') else {
            break;
        };
        let absolute_end = absolute_start + var_end;
        let var_name = &result[absolute_start + 2..absolute_end];

        match resolve(var_name, &lookup) {
            Some(value) => {
                result.replace_range(absolute_start..=absolute_end, &value);
                // Do not rescan the substituted text.
                start = absolute_start + value.len();
            }
            None => start = absolute_end + 1,
        }
    }

    result
}

fn resolve(name: &str, lookup: &impl Fn(&str) -> Option<String>) -> Option<String> {
    lookup(name).or_else(|| match name {
        "HOSTNAME" => hostname::get().ok().and_then(|h| h.into_string().ok()),
        _ => None,
    })
}
