#[test]
fn encode_message()
{
    use trafficlight::{
        context::Context,
        decode::{FieldValue, MessageValue, Value},
    };

    let context = Context::parse(&[r#"
      syntax = "proto3";
      message Message {
          string s = 1;
          int32 small = 2;
          int64 large = 3;
          sint32 signed = 4;
          fixed64 fixed = 5;
          double dbl = 6;
          bool b = 7;
          Message child = 10;
      }
    "#])
    .unwrap();

    let msg = context.get_message("Message").unwrap();

    let original = MessageValue {
        msg_ref: msg.self_ref.clone(),
        garbage: None,
        fields: vec![
            FieldValue {
                number: 1,
                value: Value::String("parent".to_string()),
            },
            FieldValue {
                number: 2,
                value: Value::Int32(123),
            },
            FieldValue {
                number: 3,
                value: Value::Int64(12356),
            },
            FieldValue {
                number: 4,
                value: Value::SInt32(-123),
            },
            FieldValue {
                number: 5,
                value: Value::Fixed64(12356),
            },
            FieldValue {
                number: 6,
                value: Value::Double(1.2345),
            },
            FieldValue {
                number: 7,
                value: Value::Bool(true),
            },
            FieldValue {
                number: 10,
                value: Value::Message(Box::new(MessageValue {
                    msg_ref: msg.self_ref.clone(),
                    garbage: None,
                    fields: vec![FieldValue {
                        number: 1,
                        value: Value::String("child".to_string()),
                    }],
                })),
            },
        ],
    };

    let expected = original.encode();
    let decoded = msg.try_decode(&expected, &context).unwrap();
    let actual = decoded.encode();

    assert_eq!(original, decoded);
    assert_eq!(expected, actual);
}

#[test]
fn encode_unknown_fields_and_garbage()
{
    use bytes::{BufMut, BytesMut};
    use trafficlight::context::Context;

    let context = Context::parse(&[r#"
      syntax = "proto3";
      message Message {
          string s = 1;
          repeated uint32 values = 2;
      }
    "#])
    .unwrap();
    let msg = context.get_message("Message").unwrap();

    let mut payload = BytesMut::new();
    payload.put_slice(b"\x0a\x02ok"); // s: "ok"
    payload.put_slice(b"\x10\x01"); // values: 1, unpacked
    payload.put_slice(b"\x12\x02\x02\x03"); // values: [2, 3], packed
    payload.put_slice(b"\x68\x07"); // unknown field 13
    payload.put_slice(b"\x00\x01"); // field number zero

    // Unknown fields and garbage are kept, so the payload survives a round trip.
    let decoded = msg.decode(&payload, &context);
    assert!(decoded.check().is_err());
    assert_eq!(decoded.encode(), payload.freeze());
}
