use thiserror::Error;

/// One typed store operation, ready to be queued for the store task.
///
/// `Incr`/`Decr` carry their delta token unparsed; the store validates it
/// when the operation is applied, so a malformed delta is reported through
/// the normal reply channel rather than as a parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Get { key: String },
    Set { key: String, value: String },
    Del { key: String },
    Incr { key: String, delta: Option<String> },
    Decr { key: String, delta: Option<String> },
}

/// Result of parsing one request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// Close the issuing connection without a reply. Never reaches the store.
    Stop,
    /// Submit this operation to the store and await its reply.
    Op(Operation),
}

/// Validation failure for one request line.
///
/// The `Display` text is exactly the reply line written back to the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Error: Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Missing key param")]
    MissingKey,
    #[error("Missing value param")]
    MissingValue,
    #[error("Missing key and value param")]
    MissingKeyAndValue,
}

/// Descriptor for one command keyword: which parameters it requires and how
/// to build the parsed request once they are validated.
struct CommandSpec {
    keyword: &'static str,
    key_required: bool,
    value_required: bool,
    build: fn(String, Option<String>) -> Parsed,
}

static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        keyword: "STOP",
        key_required: false,
        value_required: false,
        build: |_, _| Parsed::Stop,
    },
    CommandSpec {
        keyword: "GET",
        key_required: true,
        value_required: false,
        build: |key, _| Parsed::Op(Operation::Get { key }),
    },
    CommandSpec {
        keyword: "SET",
        key_required: true,
        value_required: true,
        build: |key, value| {
            Parsed::Op(Operation::Set {
                key,
                value: value.unwrap_or_default(),
            })
        },
    },
    CommandSpec {
        keyword: "DEL",
        key_required: true,
        value_required: false,
        build: |key, _| Parsed::Op(Operation::Del { key }),
    },
    CommandSpec {
        keyword: "INCR",
        key_required: true,
        value_required: false,
        build: |key, delta| Parsed::Op(Operation::Incr { key, delta }),
    },
    CommandSpec {
        keyword: "DECR",
        key_required: true,
        value_required: false,
        build: |key, delta| Parsed::Op(Operation::Decr { key, delta }),
    },
];

impl CommandSpec {
    fn validate(&self, key: Option<&str>, value: Option<&str>) -> Result<(), ParseError> {
        let key_missing = self.key_required && key.is_none();
        let value_missing = self.value_required && value.is_none();
        match (key_missing, value_missing) {
            (true, true) => Err(ParseError::MissingKeyAndValue),
            (true, false) => Err(ParseError::MissingKey),
            (false, true) => Err(ParseError::MissingValue),
            (false, false) => Ok(()),
        }
    }
}

/// Parses one request line into a typed request.
///
/// The line is trimmed and split on runs of whitespace into at most three
/// tokens: keyword, key, value. Only the first two whitespace boundaries are
/// split points, so a value keeps any embedded whitespace. The keyword is
/// matched case-insensitively against the command table.
pub fn parse(line: &str) -> Result<Parsed, ParseError> {
    let trimmed = line.trim();
    let (keyword, rest) = next_token(trimmed);
    let (key, value) = next_token(rest);

    let spec = COMMANDS
        .iter()
        .find(|spec| spec.keyword.eq_ignore_ascii_case(keyword))
        .ok_or_else(|| ParseError::InvalidCommand(trimmed.to_string()))?;

    let key = (!key.is_empty()).then(|| key.to_string());
    let value = (!value.is_empty()).then(|| value.to_string());
    spec.validate(key.as_deref(), value.as_deref())?;

    Ok((spec.build)(key.unwrap_or_default(), value))
}

/// Splits off the next whitespace-delimited token, returning it and the
/// remainder with its leading whitespace removed.
fn next_token(input: &str) -> (&str, &str) {
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], input[end..].trim_start()),
        None => (input, ""),
    }
}
