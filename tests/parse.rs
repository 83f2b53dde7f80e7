#[test]
fn parse()
{
    use trafficlight::context::{Context, Multiplicity, ValueType};

    let context = Context::parse(&[r#"
      syntax = "proto3";
      message Message {
          string s = 1;
          repeated bytes b = 2;
          optional int64 large = 3;
          repeated sint32 signed = 4;
          Message child = 10;
      }
    "#])
    .unwrap();

    let message = context.get_message("Message").unwrap();
    let fields: Vec<_> = message
        .iter_fields()
        .map(|f| (f.name.as_str(), f.number, f.field_type.clone(), f.multiplicity))
        .collect();

    assert_eq!(
        fields,
        vec![
            ("s", 1, ValueType::String, Multiplicity::Single),
            ("b", 2, ValueType::Bytes, Multiplicity::Repeated),
            ("large", 3, ValueType::Int64, Multiplicity::Optional),
            ("signed", 4, ValueType::SInt32, Multiplicity::RepeatedPacked),
            (
                "child",
                10,
                ValueType::Message(message.self_ref),
                Multiplicity::Single
            ),
        ]
    );
    assert_eq!(message.get_field_by_name("signed").unwrap().number, 4);
}

#[test]
fn parse_multiple_files()
{
    use trafficlight::context::{Context, ParseError, TypeInfo};

    let context = Context::parse(&[
        r#"
          syntax = "proto3";
          package Game.Rpc;
          import "common.proto";
          option java_package = "com.example.game";

          enum Method {
              option allow_alias = true;
              METHOD_UNSET = 0;
              METHOD_GET_PLAYER = 2;
              METHOD_PLAYER = 2;
          }
        "#,
        r#"
          syntax = "proto3";
          package Game.Rpc;

          // Refers to the enum declared in the other file.
          message GetPlayerProto {
              Method method = 1 [deprecated = true];
              map<string, int32> counters = 2;
              reserved 3, 5 to 7;
              reserved "old";
          }

          service Player {
              rpc Get(GetPlayerProto) returns (GetPlayerProto);
          }
        "#,
    ])
    .unwrap();

    let method = match context.find_type("Method") {
        Some(TypeInfo::Enum(e)) => e,
        other => panic!("Not an enum: {:?}", other),
    };
    assert_eq!(method.full_name, "Game.Rpc.Method");
    assert_eq!(method.get_field_by_value(2).unwrap().name, "METHOD_GET_PLAYER");
    assert_eq!(method.get_field_by_name("METHOD_PLAYER").unwrap().value, 2);

    let message = context.find_message("GetPlayerProto").unwrap();
    assert!(message.get_field(1).unwrap().options[0].name == "deprecated");
    assert!(message.get_field(2).unwrap().is_repeated());
    assert!(context.find_message("GetPlayerProto.CountersEntry").is_some());

    match Context::parse(&["message {"]) {
        Err(ParseError::SyntaxError { .. }) => {}
        other => panic!("Expected a syntax error: {:?}", other),
    }
}
