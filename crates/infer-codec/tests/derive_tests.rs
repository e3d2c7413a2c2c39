use infer_base::{DType, Tensor};
use infer_codec::{Codec, DecodeError};

#[derive(Debug, PartialEq, Codec)]
struct Header {
    id: u64,
    model: String,
    version: Option<String>,
}

#[derive(Debug, PartialEq, Codec)]
pub struct Visible {
    pub id: u32,
    /// Documented field.
    pub(crate) flag: bool,
}

#[derive(Debug, PartialEq, Codec)]
struct Pair(u8, String);

#[derive(Debug, PartialEq, Codec)]
struct Marker;

#[derive(Debug, PartialEq, Codec)]
struct Reply {
    id: u64,
    outcome: Result<Vec<Tensor>, String>,
}

#[derive(Debug, PartialEq, Codec)]
enum Event {
    Started,
    Progress(u32),
    Finished { code: i32, message: String },
}

#[test]
fn test_derive_struct_field_order() {
    let header = Header {
        id: 1,
        model: "m".to_string(),
        version: None,
    };
    assert_eq!(
        header.to_bytes(),
        vec![1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, b'm', 0]
    );
    assert_eq!(Header::from_bytes(&header.to_bytes()).unwrap(), header);
}

#[test]
fn test_derive_pub_fields() {
    let visible = Visible { id: 7, flag: true };
    assert_eq!(visible.to_bytes(), vec![7, 0, 0, 0, 1]);
    assert_eq!(Visible::from_bytes(&[7, 0, 0, 0, 1]).unwrap(), visible);
}

#[test]
fn test_derive_tuple_and_unit() {
    let pair = Pair(3, "ab".to_string());
    assert_eq!(Pair::from_bytes(&pair.to_bytes()).unwrap(), pair);
    assert!(Marker.to_bytes().is_empty());
    assert_eq!(Marker::from_bytes(&[]).unwrap(), Marker);
}

#[test]
fn test_derive_result_field() {
    let tensor = Tensor::new("OUT", DType::U8, vec![2], vec![4, 5]).unwrap();
    let ok = Reply {
        id: 2,
        outcome: Ok(vec![tensor]),
    };
    let err = Reply {
        id: 3,
        outcome: Err("unknown model".to_string()),
    };
    assert_eq!(Reply::from_bytes(&ok.to_bytes()).unwrap(), ok);
    assert_eq!(Reply::from_bytes(&err.to_bytes()).unwrap(), err);
}

#[test]
fn test_derive_enum_variant_index() {
    assert_eq!(Event::Started.to_bytes(), vec![0, 0, 0, 0]);
    assert_eq!(Event::Progress(9).to_bytes(), vec![1, 0, 0, 0, 9, 0, 0, 0]);

    let finished = Event::Finished {
        code: -1,
        message: "done".to_string(),
    };
    assert_eq!(Event::from_bytes(&finished.to_bytes()).unwrap(), finished);
}

#[test]
fn test_derive_enum_unknown_variant() {
    assert_eq!(
        Event::from_bytes(&[3, 0, 0, 0]),
        Err(DecodeError::InvalidVariant(3))
    );
}
