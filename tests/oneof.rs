#[test]
fn oneof()
{
    use trafficlight::context::Context;

    let context = Context::parse(&[r#"
      syntax = "proto3";
      message Message {
          oneof a {
            string a1 = 1;
            string a2 = 2;
            string a3 = 3;
          };
          oneof b {
            uint32 b1 = 4;
            uint32 b2 = 5;
            uint32 b3 = 6;
          }
          bool outside = 7;
      }
    "#])
    .unwrap();

    let message = context.get_message("Message").unwrap();
    assert_eq!(message.oneofs, vec!["a".to_string(), "b".to_string()]);

    let groups: Vec<_> = message.iter_fields().map(|f| f.oneof).collect();
    assert_eq!(
        groups,
        vec![Some(0), Some(0), Some(0), Some(1), Some(1), Some(1), None]
    );

    let value = message.try_decode(b"\x12\x02hi\x28\x05", &context).unwrap();
    assert_eq!(value.to_text(&context, true), r#"a2: "hi" b2: 5"#);
}
