use std::borrow::Cow;
use std::collections::BTreeMap;

use super::*;

#[derive(Default)]
pub(crate) struct ContextBuilder
{
    pub(crate) packages: Vec<PackageBuilder>,
}

#[derive(Default, Debug, PartialEq)]
pub(crate) struct PackageBuilder
{
    pub(crate) name: Option<String>,
    pub(crate) syntax: Syntax,
    pub(crate) types: Vec<TypeBuilder>,
}

/// Language revision of a file. Decides the default packing of repeated scalars.
#[derive(Debug, PartialEq, Clone, Copy)]
pub(crate) enum Syntax
{
    Proto2,
    Proto3,
}

impl Default for Syntax
{
    fn default() -> Self
    {
        // A file without a `syntax` statement is proto2.
        Syntax::Proto2
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum TypeBuilder
{
    Message(MessageBuilder),
    Enum(EnumBuilder),
}

#[derive(Default, Debug, PartialEq)]
pub(crate) struct MessageBuilder
{
    pub(crate) name: String,
    pub(crate) fields: Vec<FieldBuilder>,
    pub(crate) oneofs: Vec<String>,
    pub(crate) inner_types: Vec<TypeBuilder>,
}

#[derive(Default, Debug, PartialEq)]
pub(crate) struct EnumBuilder
{
    pub(crate) name: String,
    pub(crate) fields: Vec<EnumField>,
}

#[derive(Debug, PartialEq)]
pub(crate) struct FieldBuilder
{
    pub(crate) multiplicity: Multiplicity,
    pub(crate) field_type: FieldTypeBuilder,
    pub(crate) name: String,
    pub(crate) number: u64,
    pub(crate) options: Vec<ProtoOption>,
    pub(crate) oneof: Option<usize>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum FieldTypeBuilder
{
    Builtin(ValueType),
    Unknown(String),
}

impl ContextBuilder
{
    pub fn build(self) -> Result<Context, ParseError>
    {
        // First pass registers every type name so that fields can refer to types declared
        // later in the same file or in other files.
        let mut cache = BuildCache::default();
        for p in self.packages {
            p.flatten(&mut cache)?;
        }

        let pending = std::mem::take(&mut cache.pending);
        let types: Vec<TypeInfo> = pending
            .into_iter()
            .enumerate()
            .map(|(idx, p)| p.build(TypeIndex(idx), &cache))
            .collect::<Result<_, _>>()?;

        let by_full_name = types
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.full_name().to_string(), idx))
            .collect();

        Ok(Context {
            types,
            by_full_name,
        })
    }
}

impl PackageBuilder
{
    fn flatten(self, cache: &mut BuildCache) -> Result<(), ParseError>
    {
        let scope = self.name.unwrap_or_default();
        for t in self.types {
            t.flatten(&scope, self.syntax, cache)?;
        }
        Ok(())
    }
}

impl TypeBuilder
{
    fn name(&self) -> &str
    {
        match self {
            TypeBuilder::Message(m) => &m.name,
            TypeBuilder::Enum(e) => &e.name,
        }
    }

    /// Moves this type and its inner types into the build cache in declaration order.
    fn flatten(
        self,
        scope: &str,
        syntax: Syntax,
        cache: &mut BuildCache,
    ) -> Result<(), ParseError>
    {
        let full_name = match scope.is_empty() {
            true => self.name().to_string(),
            false => format!("{}.{}", scope, self.name()),
        };

        match self {
            TypeBuilder::Message(mut m) => {
                let inner_types = std::mem::take(&mut m.inner_types);
                cache.push(full_name.clone(), syntax, TypeBuilder::Message(m))?;
                for inner in inner_types {
                    inner.flatten(&full_name, syntax, cache)?;
                }
            }
            TypeBuilder::Enum(e) => cache.push(full_name, syntax, TypeBuilder::Enum(e))?,
        }

        Ok(())
    }
}

struct PendingType
{
    full_name: String,
    syntax: Syntax,
    ty: TypeBuilder,
}

impl PendingType
{
    fn build(self, self_ref: TypeIndex, cache: &BuildCache) -> Result<TypeInfo, ParseError>
    {
        let PendingType {
            full_name,
            syntax,
            ty,
        } = self;

        Ok(match ty {
            TypeBuilder::Message(m) => {
                let mut fields = BTreeMap::new();
                let mut field_numbers = BTreeMap::new();
                for f in m.fields {
                    let field = f.build(&full_name, syntax, cache)?;
                    field_numbers.insert(field.name.clone(), field.number);
                    fields.insert(field.number, field);
                }

                TypeInfo::Message(MessageInfo {
                    name: m.name,
                    full_name,
                    self_ref: MessageRef(self_ref),
                    oneofs: m.oneofs,
                    fields,
                    field_numbers,
                })
            }
            TypeBuilder::Enum(e) => {
                let mut values = BTreeMap::new();
                let mut values_by_name = BTreeMap::new();
                for f in e.fields {
                    values_by_name.insert(f.name.clone(), f.value);
                    values.entry(f.value).or_insert(f);
                }

                TypeInfo::Enum(EnumInfo {
                    name: e.name,
                    full_name,
                    self_ref: EnumRef(self_ref),
                    values,
                    values_by_name,
                })
            }
        })
    }
}

impl FieldBuilder
{
    fn build(
        self,
        scope: &str,
        syntax: Syntax,
        cache: &BuildCache,
    ) -> Result<MessageField, ParseError>
    {
        let field_type = self.field_type.build(scope, cache)?;
        let multiplicity = resolve_multiplicity(
            self.multiplicity,
            &field_type,
            &self.options,
            syntax,
        );
        Ok(MessageField {
            name: self.name,
            number: self.number,
            field_type,
            multiplicity,
            options: self.options,
            oneof: self.oneof,
        })
    }
}

fn resolve_multiplicity(
    declared: Multiplicity,
    field_type: &ValueType,
    options: &[ProtoOption],
    syntax: Syntax,
) -> Multiplicity
{
    // Only repeated scalars can be packed.
    if declared != Multiplicity::Repeated || !field_type.is_scalar() {
        return declared;
    }

    if let Some(opt) = options.iter().find(|o| o.name == "packed") {
        return match opt.value {
            Constant::Bool(true) => Multiplicity::RepeatedPacked,
            _ => Multiplicity::Repeated,
        };
    }

    match syntax {
        Syntax::Proto3 => Multiplicity::RepeatedPacked,
        Syntax::Proto2 => Multiplicity::Repeated,
    }
}

impl FieldTypeBuilder
{
    fn build(self, scope: &str, cache: &BuildCache) -> Result<ValueType, ParseError>
    {
        Ok(match self {
            FieldTypeBuilder::Builtin(vt) => vt,
            FieldTypeBuilder::Unknown(s) => {
                let (kind, idx) =
                    cache
                        .resolve_type(&s, scope)
                        .ok_or_else(|| ParseError::TypeNotFound {
                            name: s.clone(),
                            context: scope.to_string(),
                        })?;

                match kind {
                    TypeKind::Message => ValueType::Message(MessageRef(TypeIndex(idx))),
                    TypeKind::Enum => ValueType::Enum(EnumRef(TypeIndex(idx))),
                }
            }
        })
    }
}

#[derive(Default)]
struct BuildCache
{
    items: BTreeMap<String, (TypeKind, usize)>,
    pending: Vec<PendingType>,
}

impl BuildCache
{
    fn push(
        &mut self,
        full_name: String,
        syntax: Syntax,
        ty: TypeBuilder,
    ) -> Result<(), ParseError>
    {
        let kind = match ty {
            TypeBuilder::Message(..) => TypeKind::Message,
            TypeBuilder::Enum(..) => TypeKind::Enum,
        };

        if self.items.contains_key(&full_name) {
            return Err(ParseError::DuplicateType { name: full_name });
        }

        self.items
            .insert(full_name.clone(), (kind, self.pending.len()));
        self.pending.push(PendingType {
            full_name,
            syntax,
            ty,
        });
        Ok(())
    }

    /// Resolves a type name the way protoc does: relative names are looked up in the current
    /// scope first and then in each enclosing scope.
    fn resolve_type(
        &self,
        relative_name: &str,
        mut current_path: &str,
    ) -> Option<(TypeKind, usize)>
    {
        if let Some(absolute) = relative_name.strip_prefix('.') {
            return self.items.get(absolute).copied();
        }

        loop {
            let lookup: Cow<str> = match current_path.is_empty() {
                true => relative_name.into(),
                false => format!("{}.{}", current_path, relative_name).into(),
            };

            if let Some(t) = self.items.get(lookup.as_ref()) {
                return Some(*t);
            }

            if current_path.is_empty() {
                return None;
            }

            current_path = match current_path.rfind('.') {
                Some(i) => &current_path[..i],
                None => "",
            };
        }
    }
}
