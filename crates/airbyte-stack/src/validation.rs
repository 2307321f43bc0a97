//! Name checks that mirror what the Kubernetes API server enforces.
//!
//! Running them while the configuration is loaded turns a rejected request halfway
//! through an apply into an error that is reported before any object is touched.

// Adapted from Kubernetes, see apimachinery/pkg/util/validation/validation.go.

use std::{fmt::Display, sync::LazyLock};

use const_format::concatcp;
use regex::Regex;
use snafu::Snafu;

const RFC_1123_LABEL_FMT: &str = "[a-zA-Z0-9]([-a-zA-Z0-9]*[a-zA-Z0-9])?";

const RFC_1123_SUBDOMAIN_MAX_LENGTH: usize = 253;
const RFC_1123_SUBDOMAIN_FMT: &str =
    concatcp!(RFC_1123_LABEL_FMT, "(\\.", RFC_1123_LABEL_FMT, ")*");

/// Same as [`RFC_1123_SUBDOMAIN_FMT`], but allows a trailing dot
const DOMAIN_FMT: &str = concatcp!(RFC_1123_SUBDOMAIN_FMT, "\\.?");
const DOMAIN_ERROR_MSG: &str = "a domain must consist of alphanumeric characters, '-' or '.', and must start with an alphanumeric character and end with an alphanumeric character or '.'";

// Kubernetes names Namespaces after lower case RFC 1123 labels, which may start with a digit.
const RFC_1123_LABEL_MAX_LENGTH: usize = 63;
const LOWERCASE_RFC_1123_LABEL_FMT: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?";
const LOWERCASE_RFC_1123_LABEL_ERROR_MSG: &str = "a lowercase RFC 1123 label must consist of lower case alphanumeric characters or '-', and must start and end with an alphanumeric character";

// Services are named after RFC 1035 labels, which must start with a letter.
const RFC_1035_LABEL_MAX_LENGTH: usize = 63;
const RFC_1035_LABEL_FMT: &str = "[a-z]([-a-z0-9]*[a-z0-9])?";
const RFC_1035_LABEL_ERROR_MSG: &str = "a DNS-1035 label must consist of lower case alphanumeric characters or '-', start with an alphabetic character, and end with an alphanumeric character";

static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{DOMAIN_FMT}$")).expect("failed to compile domain regex")
});

static LOWERCASE_RFC_1123_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{LOWERCASE_RFC_1123_LABEL_FMT}$"))
        .expect("failed to compile lowercase RFC 1123 label regex")
});

static RFC_1035_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{RFC_1035_LABEL_FMT}$")).expect("failed to compile RFC 1035 label regex")
});

type Result<T = (), E = Errors> = std::result::Result<T, E>;

/// All errors found while validating a single value.
#[derive(Debug)]
pub struct Errors(Vec<Error>);

impl Errors {
    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.0.iter()
    }
}

impl Display for Errors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{msg} (e.g. {example:?}, regex used for validation is {regex:?})"))]
    Mismatch {
        msg: &'static str,
        regex: &'static str,
        example: &'static str,
    },

    #[snafu(display("input is {length} bytes long but must be no more than {max_length}"))]
    TooLong { length: usize, max_length: usize },

    #[snafu(display("input must not be empty"))]
    Empty,
}

fn validate_str_length(value: &str, max_length: usize) -> Result<(), Error> {
    if value.len() > max_length {
        TooLongSnafu {
            length: value.len(),
            max_length,
        }
        .fail()
    } else {
        Ok(())
    }
}

fn validate_str_regex(
    value: &str,
    regex: &'static Regex,
    msg: &'static str,
    example: &'static str,
) -> Result<(), Error> {
    if regex.is_match(value) {
        return Ok(());
    }

    MismatchSnafu {
        msg,
        regex: regex
            .as_str()
            .trim_start_matches('^')
            .trim_end_matches('$'),
        example,
    }
    .fail()
}

/// Returns [`Ok`] if *all* validations are [`Ok`], otherwise returns all errors.
fn validate_all(validations: impl IntoIterator<Item = Result<(), Error>>) -> Result {
    let errors = validations
        .into_iter()
        .filter_map(Result::err)
        .collect::<Vec<_>>();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Errors(errors))
    }
}

/// Tests for a string that can be used as a cluster domain, e.g. `cluster.local`.
pub fn is_domain(value: &str) -> Result {
    validate_all([
        validate_str_length(value, RFC_1123_SUBDOMAIN_MAX_LENGTH),
        validate_str_regex(value, &DOMAIN_REGEX, DOMAIN_ERROR_MSG, "cluster.local"),
    ])
}

/// Tests for a string that conforms to the definition of a lowercase label in DNS
/// (RFC 1123).
///
/// This is the rule Kubernetes applies to Namespace names.
pub fn is_lowercase_rfc_1123_label(value: &str) -> Result {
    validate_all([
        validate_str_length(value, RFC_1123_LABEL_MAX_LENGTH),
        validate_str_regex(
            value,
            &LOWERCASE_RFC_1123_LABEL_REGEX,
            LOWERCASE_RFC_1123_LABEL_ERROR_MSG,
            "1-airbyte",
        ),
    ])
}

/// Tests for a string that conforms to the definition of a label in DNS (RFC 1035).
///
/// This is the rule Kubernetes applies to Service names.
pub fn is_rfc_1035_label(value: &str) -> Result {
    validate_all([
        validate_str_length(value, RFC_1035_LABEL_MAX_LENGTH),
        validate_str_regex(
            value,
            &RFC_1035_LABEL_REGEX,
            RFC_1035_LABEL_ERROR_MSG,
            "airbyte",
        ),
    ])
}

/// Rejects empty and whitespace-only strings.
pub fn is_not_blank(value: &str) -> Result {
    validate_all([if value.trim().is_empty() {
        EmptySnafu.fail()
    } else {
        Ok(())
    }])
}
