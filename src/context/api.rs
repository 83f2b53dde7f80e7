use super::*;

impl Context
{
    /// Looks up a type by its full name, e.g. `Game.Rpc.GetInboxProto`.
    pub fn get_type(&self, full_name: &str) -> Option<&TypeInfo>
    {
        let idx = *self.by_full_name.get(full_name)?;
        self.types.get(idx)
    }

    /// Looks up a message type by its full name.
    pub fn get_message(&self, full_name: &str) -> Option<&MessageInfo>
    {
        self.get_type(full_name).and_then(TypeInfo::as_message)
    }

    /// Looks up a type by its full name, or by a `.`-separated suffix of the full name that
    /// only one type has.
    ///
    /// `AllMessagesProto` finds `Game.Rpc.AllMessagesProto` unless another package declares
    /// a type of the same name.
    pub fn find_type(&self, name: &str) -> Option<&TypeInfo>
    {
        if let Some(found) = self.get_type(name) {
            return Some(found);
        }

        let suffix = format!(".{}", name);
        let mut candidates = self
            .types
            .iter()
            .filter(|t| t.full_name().ends_with(&suffix));
        match (candidates.next(), candidates.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    /// Message counterpart of [`Context::find_type`].
    pub fn find_message(&self, name: &str) -> Option<&MessageInfo>
    {
        self.find_type(name).and_then(TypeInfo::as_message)
    }

    /// Every declared type, in declaration order with nested types after their parent.
    pub fn iter_types(&self) -> impl Iterator<Item = &TypeInfo>
    {
        self.types.iter()
    }

    /// Resolves a message handle.
    ///
    /// Handles are only valid for the context that created them. A handle from another
    /// context may resolve to an unrelated type or **panic**.
    pub fn resolve_message(&self, msg_ref: MessageRef) -> &MessageInfo
    {
        match self.types.get((msg_ref.0).0) {
            Some(TypeInfo::Message(m)) => m,
            _ => panic!("{:?} is not a message of this context", msg_ref),
        }
    }

    /// Resolves an enum handle. Panics like [`Context::resolve_message`].
    pub fn resolve_enum(&self, enum_ref: EnumRef) -> &EnumInfo
    {
        match self.types.get((enum_ref.0).0) {
            Some(TypeInfo::Enum(e)) => e,
            _ => panic!("{:?} is not an enum of this context", enum_ref),
        }
    }
}

impl TypeInfo
{
    /// Name as declared.
    pub fn name(&self) -> &str
    {
        match self {
            TypeInfo::Message(m) => &m.name,
            TypeInfo::Enum(e) => &e.name,
        }
    }

    /// Fully qualified name.
    pub fn full_name(&self) -> &str
    {
        match self {
            TypeInfo::Message(m) => &m.full_name,
            TypeInfo::Enum(e) => &e.full_name,
        }
    }

    /// Message or enum.
    pub fn kind(&self) -> TypeKind
    {
        match self {
            TypeInfo::Message(..) => TypeKind::Message,
            TypeInfo::Enum(..) => TypeKind::Enum,
        }
    }

    fn as_message(&self) -> Option<&MessageInfo>
    {
        match self {
            TypeInfo::Message(m) => Some(m),
            TypeInfo::Enum(..) => None,
        }
    }
}

impl MessageInfo
{
    /// Fields ordered by number.
    pub fn iter_fields(&self) -> impl Iterator<Item = &MessageField>
    {
        self.fields.values()
    }

    /// The field with the given number.
    pub fn get_field(&self, number: u64) -> Option<&MessageField>
    {
        self.fields.get(&number)
    }

    /// The field with the given name.
    pub fn get_field_by_name(&self, name: &str) -> Option<&MessageField>
    {
        let number = self.field_numbers.get(name)?;
        self.fields.get(number)
    }
}

impl EnumInfo
{
    /// The name of a value. For aliased values this is the name declared first.
    pub fn get_field_by_value(&self, value: i64) -> Option<&EnumField>
    {
        self.values.get(&value)
    }

    /// The value with the given name. Aliases resolve to the first declared name.
    pub fn get_field_by_name(&self, name: &str) -> Option<&EnumField>
    {
        let value = self.values_by_name.get(name)?;
        self.values.get(value)
    }

    /// Distinct values in numeric order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &EnumField>
    {
        self.values.values()
    }
}

impl MessageField
{
    /// True for `repeated` fields, packed or not.
    pub fn is_repeated(&self) -> bool
    {
        matches!(
            self.multiplicity,
            Multiplicity::Repeated | Multiplicity::RepeatedPacked
        )
    }
}

impl ValueType
{
    /// Wire type used for a single value of this type.
    pub(crate) fn wire_type(&self) -> u8
    {
        match self {
            ValueType::Int32
            | ValueType::Int64
            | ValueType::UInt32
            | ValueType::UInt64
            | ValueType::SInt32
            | ValueType::SInt64
            | ValueType::Bool
            | ValueType::Enum(..) => 0,
            ValueType::Double | ValueType::Fixed64 | ValueType::SFixed64 => 1,
            ValueType::String | ValueType::Bytes | ValueType::Message(..) => 2,
            ValueType::Float | ValueType::Fixed32 | ValueType::SFixed32 => 5,
        }
    }

    /// Types that can be packed when repeated.
    pub(crate) fn is_scalar(&self) -> bool
    {
        self.wire_type() != 2
    }
}
