use anyhow::Context as _;
use prost::Message as _;

use super::*;

#[derive(Clone, PartialEq, prost::Message)]
struct PointProto {
    #[prost(uint64, optional, tag = "1")]
    x: Option<u64>,
    #[prost(uint64, optional, tag = "2")]
    y: Option<u64>,
}

#[derive(Debug, PartialEq)]
struct Point {
    x: u64,
    y: u64,
}

impl ProtoFmt for Point {
    type Proto = PointProto;

    fn read(r: &Self::Proto) -> anyhow::Result<Self> {
        Ok(Self {
            x: *required(&r.x).context("x")?,
            y: *required(&r.y).context("y")?,
        })
    }

    fn build(&self) -> Self::Proto {
        PointProto {
            x: Some(self.x),
            y: Some(self.y),
        }
    }
}

#[test]
fn encode_decode() {
    testonly::test_encode(&Point { x: 0, y: 17 });
}

#[test]
fn missing_fields_are_rejected() {
    let bytes = PointProto {
        x: Some(3),
        y: None,
    }
    .encode_to_vec();
    let err = decode::<Point>(&bytes).unwrap_err();
    assert!(format!("{err:#}").contains("y"));
}

#[test]
fn garbage_is_rejected() {
    assert!(decode::<Point>(&[0xff, 0xff, 0xff]).is_err());
}
