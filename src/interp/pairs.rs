use std::{collections::BTreeMap, sync::Arc};

use anyhow::{bail, ensure, Context, Result};

/// An ordered pair of region labels from two different layers, e.g. (county, district).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    pub a: Arc<str>,
    pub b: Arc<str>,
}

/// String encodings of a [`PairKey`] for storage keyed by a single string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEncoding {
    /// `C{byte length of a}:{a}D{b}`. Round-trips any pair of labels.
    #[default]
    LengthPrefixed,
    /// `C{a}D{b}`, split on the first `D`. Only valid when `a` contains no `D`.
    Legacy,
}

impl PairKey {
    pub fn new(a: impl Into<Arc<str>>, b: impl Into<Arc<str>>) -> Self {
        Self { a: a.into(), b: b.into() }
    }

    /// Encode as a single string token.
    pub fn encode(&self, encoding: KeyEncoding) -> Result<String> {
        match encoding {
            KeyEncoding::LengthPrefixed => Ok(format!("C{}:{}D{}", self.a.len(), self.a, self.b)),
            KeyEncoding::Legacy => {
                // A 'D' inside the first label would be read back as the delimiter.
                ensure!(
                    !self.a.contains('D'),
                    "[PairKey.encode] label '{}' contains the legacy delimiter 'D'", self.a
                );
                Ok(format!("C{}D{}", self.a, self.b))
            }
        }
    }

    /// Parse a token produced by [`PairKey::encode`] with the same encoding.
    pub fn decode(token: &str, encoding: KeyEncoding) -> Result<Self> {
        let Some(body) = token.strip_prefix('C') else {
            bail!("[PairKey.decode] token '{token}' does not start with 'C'")
        };

        match encoding {
            KeyEncoding::LengthPrefixed => {
                let (len, rest) = body.split_once(':')
                    .with_context(|| format!("[PairKey.decode] token '{token}' has no length prefix"))?;
                let len = len.parse::<usize>()
                    .with_context(|| format!("[PairKey.decode] bad length prefix in '{token}'"))?;
                let a = rest.get(..len)
                    .with_context(|| format!("[PairKey.decode] length prefix out of range in '{token}'"))?;
                let b = rest[len..].strip_prefix('D')
                    .with_context(|| format!("[PairKey.decode] missing 'D' after first label in '{token}'"))?;
                Ok(Self::new(a, b))
            }
            KeyEncoding::Legacy => {
                let (a, b) = body.split_once('D')
                    .with_context(|| format!("[PairKey.decode] token '{token}' has no 'D' delimiter"))?;
                Ok(Self::new(a, b))
            }
        }
    }
}

/// Sparse table of non-negative values (populations) per label pair.
/// Pairs with a zero value are never stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairTable {
    values: BTreeMap<PairKey, f64>,
}

impl PairTable {
    pub fn new() -> Self { Self::default() }

    /// Number of stored (non-zero) pairs.
    #[inline] pub fn len(&self) -> usize { self.values.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Value for the pair `(a, b)`, if non-zero.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        self.values.get(&PairKey::new(a, b)).copied()
    }

    /// Iterate over pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&PairKey, f64)> {
        self.values.iter().map(|(key, &value)| (key, value))
    }

    /// Sum of all values.
    pub fn total(&self) -> f64 { self.values.values().sum() }

    /// Sum of values grouped by the first label.
    pub fn totals_by_a(&self) -> BTreeMap<Arc<str>, f64> {
        let mut totals = BTreeMap::new();
        for (key, value) in &self.values {
            *totals.entry(key.a.clone()).or_insert(0.0) += value;
        }
        totals
    }

    /// Add `value` to the pair `key`.
    pub(crate) fn add(&mut self, key: PairKey, value: f64) {
        if value > 0.0 { *self.values.entry(key).or_insert(0.0) += value }
    }

    /// Serialize as a JSON object of `{ token: value }`.
    pub fn to_json(&self, encoding: KeyEncoding) -> Result<String> {
        let object = self.values.iter()
            .map(|(key, &value)| -> Result<(String, f64)> { Ok((key.encode(encoding)?, value)) })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(serde_json::to_string(&object)?)
    }

    /// Parse a JSON object written by [`PairTable::to_json`].
    pub fn from_json(json: &str, encoding: KeyEncoding) -> Result<Self> {
        let object: BTreeMap<String, f64> = serde_json::from_str(json)
            .context("[PairTable.from_json] expected an object of numbers")?;

        let mut table = Self::new();
        for (token, value) in object {
            ensure!(
                value.is_finite() && value >= 0.0,
                "[PairTable.from_json] value for '{token}' must be a non-negative number, got {value}"
            );
            table.add(PairKey::decode(&token, encoding)?, value);
        }
        Ok(table)
    }
}

impl FromIterator<(PairKey, f64)> for PairTable {
    fn from_iter<I: IntoIterator<Item = (PairKey, f64)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (key, value) in iter { table.add(key, value) }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_round_trips_labels_with_delimiters() {
        let key = PairKey::new("D1:C", "DD");
        let token = key.encode(KeyEncoding::LengthPrefixed).unwrap();
        assert_eq!(token, "C4:D1:CDDD");
        assert_eq!(PairKey::decode(&token, KeyEncoding::LengthPrefixed).unwrap(), key);
    }

    #[test]
    fn legacy_encoding_matches_stored_files() {
        let key = PairKey::new("001", "05");
        let token = key.encode(KeyEncoding::Legacy).unwrap();
        assert_eq!(token, "C001D05");
        assert_eq!(PairKey::decode(&token, KeyEncoding::Legacy).unwrap(), key);

        // The second label may contain the delimiter; only the first split counts.
        assert_eq!(PairKey::decode("C7DAD", KeyEncoding::Legacy).unwrap(), PairKey::new("7", "AD"));
    }

    #[test]
    fn legacy_encoding_refuses_ambiguous_labels() {
        assert!(PairKey::new("DC", "01").encode(KeyEncoding::Legacy).is_err());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in ["001D05", "C3001D05", "C9:001D05", "C3:001X05", "Cx:001D05"] {
            assert!(PairKey::decode(token, KeyEncoding::LengthPrefixed).is_err(), "{token}");
        }
        assert!(PairKey::decode("C00105", KeyEncoding::Legacy).is_err());
    }

    #[test]
    fn table_drops_zeros_and_sums() {
        let table: PairTable = [
            (PairKey::new("001", "1"), 40.0),
            (PairKey::new("001", "2"), 0.0),
            (PairKey::new("001", "1"), 10.0),
            (PairKey::new("003", "2"), 25.0),
        ].into_iter().collect();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("001", "1"), Some(50.0));
        assert_eq!(table.get("001", "2"), None);
        assert_eq!(table.total(), 75.0);
        assert_eq!(table.totals_by_a().get("003").copied(), Some(25.0));
    }

    #[test]
    fn json_round_trip() {
        let table: PairTable = [(PairKey::new("001", "1"), 12.5), (PairKey::new("D", "C"), 3.0)].into_iter().collect();
        let json = table.to_json(KeyEncoding::LengthPrefixed).unwrap();
        assert_eq!(PairTable::from_json(&json, KeyEncoding::LengthPrefixed).unwrap(), table);

        assert!(table.to_json(KeyEncoding::Legacy).is_err());
        assert!(PairTable::from_json(r#"{ "C001D1": -1.0 }"#, KeyEncoding::Legacy).is_err());
    }
}
