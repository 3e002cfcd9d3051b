//! Parsing of decoded QR text into a record and the value of interest.
//!
//! Payloads are `;`-delimited. Each field is either `key:value` or a bare
//! positional value, e.g. `WIFI:S:MyWifi;T:WPA;P:secret123;H:false;;`.
//!
//! Selection rule, in order:
//! 1. keyed: the configured key appears as a `key:value` field with a
//!    non-empty value (the last occurrence wins);
//! 2. positional: the record has exactly `positional_arity` fields and the
//!    field at `positional_index` is non-empty after stripping any `key:`
//!    prefix;
//! 3. otherwise there is no record.

const DELIMITER: char = ';';
const SCHEME_PREFIX: &str = "WIFI:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub key: Option<String>,
    pub value: String,
}

impl Field {
    fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() => Field {
                key: Some(key.trim().to_string()),
                value: value.to_string(),
            },
            _ => Field {
                key: None,
                value: raw.to_string(),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordShape {
    Keyed,
    Positional,
}

/// A parsed payload. Always carries a non-empty value of interest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedRecord {
    fields: Vec<Field>,
    shape: RecordShape,
    value: String,
}

impl DecodedRecord {
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn shape(&self) -> RecordShape {
        self.shape
    }

    /// The extracted field of interest.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn into_value(self) -> String {
        self.value
    }

    /// Look up a keyed field; the last occurrence wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|field| field.key.as_deref() == Some(key))
            .map(|field| field.value.as_str())
    }
}

/// Which field of a payload holds the value to publish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadSchema {
    pub key: String,
    pub positional_arity: usize,
    pub positional_index: usize,
}

impl Default for PayloadSchema {
    fn default() -> Self {
        Self {
            key: "P".to_string(),
            positional_arity: 4,
            positional_index: 2,
        }
    }
}

impl PayloadSchema {
    /// Parse `raw`, returning `None` when the payload has no usable value.
    pub fn parse(&self, raw: &str) -> Option<DecodedRecord> {
        let fields = split_fields(raw);
        if fields.is_empty() {
            return None;
        }

        let keyed = fields
            .iter()
            .rev()
            .find(|field| field.key.as_deref() == Some(self.key.as_str()))
            .map(|field| field.value.clone())
            .filter(|value| !value.is_empty());
        if let Some(value) = keyed {
            return Some(DecodedRecord {
                fields,
                shape: RecordShape::Keyed,
                value,
            });
        }

        if fields.len() != self.positional_arity {
            return None;
        }
        let value = fields
            .get(self.positional_index)
            .map(|field| field.value.clone())
            .filter(|value| !value.is_empty())?;
        Some(DecodedRecord {
            fields,
            shape: RecordShape::Positional,
            value,
        })
    }
}

fn split_fields(raw: &str) -> Vec<Field> {
    let normalized = raw.replace("\r\n", ";").replace(['\r', '\n'], ";");
    let mut body = normalized.trim_matches(DELIMITER);
    if body.len() >= SCHEME_PREFIX.len()
        && body.is_char_boundary(SCHEME_PREFIX.len())
        && body[..SCHEME_PREFIX.len()].eq_ignore_ascii_case(SCHEME_PREFIX)
    {
        body = body[SCHEME_PREFIX.len()..].trim_start_matches(DELIMITER);
    }

    body.split(DELIMITER)
        .filter(|field| !field.is_empty())
        .map(Field::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> PayloadSchema {
        PayloadSchema::default()
    }

    #[test]
    fn keyed_wifi_payload_yields_password() {
        let record = schema().parse("S:MyWifi;T:WPA;P:secret123;H:false").unwrap();
        assert_eq!(record.value(), "secret123");
        assert_eq!(record.shape(), RecordShape::Keyed);
        assert_eq!(record.get("S"), Some("MyWifi"));
        assert_eq!(record.fields().len(), 4);
    }

    #[test]
    fn scheme_prefix_and_trailing_delimiters_are_stripped() {
        let record = schema()
            .parse("WIFI:S:MySSID;T:WPA;P:mypassword;H:false;;")
            .unwrap();
        assert_eq!(record.value(), "mypassword");
        assert_eq!(record.get("S"), Some("MySSID"));
    }

    #[test]
    fn garbage_payload_has_no_record() {
        assert_eq!(schema().parse("garbage;no-colon-fields"), None);
    }

    #[test]
    fn empty_and_delimiter_only_payloads_have_no_record() {
        assert_eq!(schema().parse(""), None);
        assert_eq!(schema().parse(";;;"), None);
        assert_eq!(schema().parse("\n\r\n"), None);
    }

    #[test]
    fn positional_record_uses_fixed_index() {
        let record = schema().parse("MyWifi;WPA;hunter2;false").unwrap();
        assert_eq!(record.value(), "hunter2");
        assert_eq!(record.shape(), RecordShape::Positional);
    }

    #[test]
    fn positional_value_has_key_prefix_stripped() {
        let record = schema().parse("S:MyWifi;T:WPA;K:hunter2;H:false").unwrap();
        assert_eq!(record.value(), "hunter2");
        assert_eq!(record.shape(), RecordShape::Positional);
    }

    #[test]
    fn keyed_lookup_takes_precedence_over_position() {
        // Index 2 holds "T:WPA" but the keyed field wins.
        let record = schema().parse("S:MyWifi;H:false;T:WPA;P:pw").unwrap();
        assert_eq!(record.value(), "pw");
        assert_eq!(record.shape(), RecordShape::Keyed);
    }

    #[test]
    fn wrong_arity_without_key_has_no_record() {
        assert_eq!(schema().parse("S:MyWifi;T:WPA;H:false"), None);
        assert_eq!(schema().parse("a;b;c;d;e"), None);
    }

    #[test]
    fn empty_value_of_interest_is_absent() {
        assert_eq!(schema().parse("S:x;P:;H:false"), None);
    }

    #[test]
    fn line_breaks_act_as_delimiters() {
        let record = schema().parse("S:Net\r\nT:WPA\nP:abc:def\rH:true").unwrap();
        assert_eq!(record.value(), "abc:def");
    }

    #[test]
    fn last_duplicate_key_wins() {
        let record = schema().parse("P:first;P:second").unwrap();
        assert_eq!(record.value(), "second");
    }

    #[test]
    fn custom_key_selects_other_field() {
        let schema = PayloadSchema {
            key: "S".to_string(),
            ..PayloadSchema::default()
        };
        assert_eq!(
            schema.parse("S:MyWifi;T:WPA;P:x").map(DecodedRecord::into_value),
            Some("MyWifi".to_string())
        );
    }

    #[test]
    fn parse_never_panics_on_odd_input() {
        for raw in ["::", ":;:", "WIFI:", "wifi:;", "é;ü:ß", "P", ";P:;"] {
            let _ = schema().parse(raw);
        }
    }
}
