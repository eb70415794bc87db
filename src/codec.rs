//! Value encoding applied at the store boundary

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Errors raised while encoding or decoding a value
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack encode: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    #[error("msgpack decode: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),
}

/// Wire encoding used for every stored value.
///
/// Both encodings satisfy the same round-trip contract; picking one is a
/// configuration decision. MessagePack writes structs as maps keyed by field
/// name, so records stay readable by other MessagePack clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Json,
    #[serde(alias = "msgpack")]
    MessagePack,
}

impl Codec {
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            Codec::Json => Ok(serde_json::to_vec(value)?),
            Codec::MessagePack => Ok(rmp_serde::to_vec_named(value)?),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        match self {
            Codec::Json => Ok(serde_json::from_slice(bytes)?),
            Codec::MessagePack => Ok(rmp_serde::from_slice(bytes)?),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::MessagePack => "msgpack",
        }
    }
}

impl std::str::FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Codec::Json),
            "msgpack" | "messagepack" => Ok(Codec::MessagePack),
            other => Err(format!("unknown codec: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        age: i64,
    }

    const CODECS: [Codec; 2] = [Codec::Json, Codec::MessagePack];

    #[test]
    fn struct_survives_both_codecs() {
        for codec in CODECS {
            let user = User {
                name: "Alice".to_string(),
                age: 30,
            };
            let bytes = codec.encode(&user).unwrap();
            assert_eq!(codec.decode::<User>(&bytes).unwrap(), user);
        }
    }

    #[test]
    fn msgpack_writes_structs_as_maps() {
        let bytes = Codec::MessagePack
            .encode(&User {
                name: "Bob".to_string(),
                age: 1,
            })
            .unwrap();
        // fixmap with two entries
        assert_eq!(bytes[0], 0x82);
    }

    #[test]
    fn json_reads_what_other_clients_wrote() {
        let user: User = Codec::Json.decode(br#"{"name":"Alice","age":30}"#).unwrap();
        assert_eq!(user.name, "Alice");
        assert_eq!(user.age, 30);
    }

    #[test]
    fn shape_mismatch_is_a_decode_error() {
        for codec in CODECS {
            let bytes = codec.encode("not a number").unwrap();
            assert!(codec.decode::<i64>(&bytes).is_err());
        }
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        assert!(matches!(
            Codec::Json.decode::<String>(b"{oops"),
            Err(CodecError::Json(_))
        ));
        assert!(matches!(
            Codec::MessagePack.decode::<String>(&[0xc1]),
            Err(CodecError::MsgpackDecode(_))
        ));
    }

    #[test]
    fn parses_codec_names() {
        assert_eq!("json".parse::<Codec>().unwrap(), Codec::Json);
        assert_eq!("MsgPack".parse::<Codec>().unwrap(), Codec::MessagePack);
        assert!("yaml".parse::<Codec>().is_err());
    }

    proptest! {
        #[test]
        fn primitives_and_maps_round_trip(
            s in ".*",
            i in any::<i64>(),
            b in any::<bool>(),
            f in -1.0e12f64..1.0e12,
            m in proptest::collection::btree_map(".{0,8}", ".{0,8}", 0..8),
        ) {
            for codec in CODECS {
                prop_assert_eq!(codec.decode::<String>(&codec.encode(&s).unwrap()).unwrap(), s.clone());
                prop_assert_eq!(codec.decode::<i64>(&codec.encode(&i).unwrap()).unwrap(), i);
                prop_assert_eq!(codec.decode::<bool>(&codec.encode(&b).unwrap()).unwrap(), b);
                prop_assert_eq!(codec.decode::<f64>(&codec.encode(&f).unwrap()).unwrap(), f);
                let back: BTreeMap<String, String> = codec.decode(&codec.encode(&m).unwrap()).unwrap();
                prop_assert_eq!(back, m.clone());
            }
        }
    }
}
