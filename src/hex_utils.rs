//! Hex helpers for byte fields in request and reply structures
//!
//! Raw transactions, signatures, public keys and sign-hashes travel as byte
//! vectors internally and as lowercase hex strings on the JSON surface.

use serde::{de, Deserialize, Deserializer, Serializer};

/// Serde adapter for `Vec<u8>` fields
pub mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_hex(&s).map_err(de::Error::custom)
    }
}

/// Serde adapter for `Vec<Vec<u8>>` fields
pub mod hex_bytes_list {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&hex::encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let items = Vec::<String>::deserialize(deserializer)?;
        items
            .iter()
            .map(|s| super::decode_hex(s).map_err(de::Error::custom))
            .collect()
    }
}

/// Decode a hex string, tolerating an optional `0x` prefix and surrounding whitespace
pub fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let trimmed = s.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Sample {
        #[serde(with = "hex_bytes")]
        data: Vec<u8>,
        #[serde(with = "hex_bytes_list")]
        hashes: Vec<Vec<u8>>,
    }

    #[test]
    fn test_json_shape() {
        let sample = Sample {
            data: vec![0xde, 0xad],
            hashes: vec![vec![0x01], vec![0xff, 0x00]],
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"data":"dead","hashes":["01","ff00"]}"#);
        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn test_decode_hex_prefix() {
        assert_eq!(decode_hex(" 0xABcd ").unwrap(), vec![0xab, 0xcd]);
        assert!(decode_hex("zz").is_err());
    }
}
