// Storage encoding: bincode 2 for rows and blobs, serde_json for the transactions column.
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Serialize data using bincode 2.0 with standard configuration
pub fn serialize<T: bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    bincode::encode_to_vec(data, bincode::config::standard())
        .map_err(|e| LedgerError::Persistence(format!("Serialization failed: {e}")))
}

/// Deserialize data using bincode 2.0 with standard configuration
pub fn deserialize<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T> {
    let (data, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| LedgerError::Persistence(format!("Deserialization failed: {e}")))?;
    Ok(data)
}

pub fn to_json<T: Serialize + ?Sized>(data: &T) -> Result<String> {
    serde_json::to_string(data)
        .map_err(|e| LedgerError::Persistence(format!("JSON encoding failed: {e}")))
}

pub fn from_json<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| LedgerError::Persistence(format!("JSON decoding failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
    struct Row {
        id: u64,
        label: String,
        payload: Vec<u8>,
    }

    #[test]
    fn test_bincode_round_trip() {
        let original = Row {
            id: 7,
            label: "genesis".to_string(),
            payload: vec![1, 2, 3],
        };
        let bytes = serialize(&original).unwrap();
        let decoded: Row = deserialize(&bytes).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_deserialize_invalid_data() {
        let result: Result<Row> = deserialize(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(LedgerError::Persistence(_))));
    }

    #[test]
    fn test_json_rejects_garbage() {
        let result: Result<Vec<Row>> = from_json("{not json");
        assert!(matches!(result, Err(LedgerError::Persistence(_))));
    }
}
