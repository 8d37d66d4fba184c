//! Adaptation of one compiled unit into the target namespace.
//!
//! Traversal order is fixed: declaration, fields, methods, annotations,
//! inner classes. Each step either keeps a renamed element or drops it;
//! nothing is emitted for a unit until every step has succeeded.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::{AdapterConfig, FieldConversion};
use crate::descriptor::{MethodType, rewrite_descriptor, rewrite_method_descriptor};
use crate::error::{ConfigError, DescriptorError};
use crate::rename::{NameMapper, Renamer};
use crate::signature::{rewrite_class_signature, rewrite_field_signature, rewrite_method_signature};
use crate::unit::{Access, Annotation, CompiledUnit, ElementValue, Field, InnerClass, Method};

/// Why a unit produced no output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SuppressReason {
    /// Neither public nor protected.
    NotExported,
    /// The renamed name starts with an exclusion prefix.
    Excluded { prefix: String },
    /// Another unit already produced the same renamed name.
    Duplicate { name: String },
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressReason::NotExported => f.write_str("not public or protected"),
            SuppressReason::Excluded { prefix } => write!(f, "excluded by prefix `{prefix}`"),
            SuppressReason::Duplicate { name } => write!(f, "duplicate of renamed unit `{name}`"),
        }
    }
}

/// Result of adapting one unit.
#[derive(Clone, Debug, PartialEq)]
pub enum Adapted {
    Kept { name: String, unit: CompiledUnit },
    Suppressed(SuppressReason),
}

/// Immutable adaptation settings shared by every unit of a batch.
#[derive(Clone, Debug)]
pub struct Adapter {
    renamer: Renamer,
    exclude: Vec<String>,
    supertype_overrides: BTreeMap<String, String>,
    field_conversions: Vec<FieldConversion>,
}

impl Adapter {
    pub fn new(config: &AdapterConfig) -> Result<Self, ConfigError> {
        Ok(Adapter {
            renamer: config.renamer()?,
            exclude: config.exclude.clone(),
            supertype_overrides: config.supertype_overrides.clone(),
            field_conversions: config.field_conversions.clone(),
        })
    }

    pub fn renamer(&self) -> &Renamer {
        &self.renamer
    }

    fn rename(&self, name: &str) -> String {
        self.renamer.map_name(name).into_owned()
    }

    fn converts_to_field(&self, owner: &str, method: &Method) -> bool {
        method.descriptor.starts_with("()")
            && self
                .field_conversions
                .iter()
                .any(|conversion| conversion.owner == owner && conversion.method == method.name)
    }

    /// Adapts `unit`, or explains why it is dropped. A malformed descriptor
    /// or signature anywhere in the unit fails the whole unit.
    pub fn adapt(&self, unit: &CompiledUnit) -> Result<Adapted, DescriptorError> {
        if !unit.access.is_exported() {
            return Ok(Adapted::Suppressed(SuppressReason::NotExported));
        }
        let name = self.rename(&unit.name);
        if let Some(prefix) = self.exclude.iter().find(|prefix| name.starts_with(prefix.as_str())) {
            return Ok(Adapted::Suppressed(SuppressReason::Excluded {
                prefix: prefix.clone(),
            }));
        }

        let mut super_name = match self.supertype_overrides.get(&name) {
            Some(forced) => Some(forced.clone()),
            None => unit.super_name.as_deref().map(|super_name| self.rename(super_name)),
        };
        if super_name.as_deref() == Some(name.as_str()) {
            super_name = None;
        }
        let signature = unit
            .signature
            .as_deref()
            .map(|signature| rewrite_class_signature(signature, &self.renamer))
            .transpose()?;

        let mut fields = Vec::with_capacity(unit.fields.len());
        for field in unit.fields.iter().filter(|field| field.access.is_exported()) {
            fields.push(self.adapt_field(field)?);
        }

        let mut methods = Vec::with_capacity(unit.methods.len());
        for method in unit.methods.iter().filter(|method| method.access.is_exported()) {
            if self.converts_to_field(&name, method) {
                fields.push(self.convert_to_field(method)?);
            } else {
                methods.push(self.adapt_method(method)?);
            }
        }

        let annotations = self.adapt_annotations(&unit.annotations)?;

        let inner_classes = unit
            .inner_classes
            .iter()
            .filter(|inner| inner.access.is_exported())
            .map(|inner| InnerClass {
                name: self.rename(&inner.name),
                outer_name: inner.outer_name.as_deref().map(|outer| self.rename(outer)),
                simple_name: inner.simple_name.clone(),
                access: inner.access,
            })
            .collect();

        let adapted = CompiledUnit {
            minor_version: unit.minor_version,
            major_version: unit.major_version,
            access: unit.access,
            name: name.clone(),
            super_name,
            interfaces: unit.interfaces.iter().map(|interface| self.rename(interface)).collect(),
            signature,
            fields,
            methods,
            annotations,
            inner_classes,
        };
        Ok(Adapted::Kept {
            name,
            unit: adapted,
        })
    }

    fn adapt_field(&self, field: &Field) -> Result<Field, DescriptorError> {
        Ok(Field {
            access: field.access,
            name: field.name.clone(),
            descriptor: rewrite_descriptor(&field.descriptor, &self.renamer)?,
            signature: field
                .signature
                .as_deref()
                .map(|signature| rewrite_field_signature(signature, &self.renamer))
                .transpose()?,
            constant: field.constant.clone(),
            annotations: self.adapt_annotations(&field.annotations)?,
        })
    }

    fn adapt_method(&self, method: &Method) -> Result<Method, DescriptorError> {
        Ok(Method {
            access: method.access,
            name: method.name.clone(),
            descriptor: rewrite_method_descriptor(&method.descriptor, &self.renamer)?,
            signature: method
                .signature
                .as_deref()
                .map(|signature| rewrite_method_signature(signature, &self.renamer))
                .transpose()?,
            exceptions: method
                .exceptions
                .iter()
                .map(|exception| self.rename(exception))
                .collect(),
            annotations: self.adapt_annotations(&method.annotations)?,
            annotation_default: method
                .annotation_default
                .as_ref()
                .map(|value| self.adapt_element(value))
                .transpose()?,
        })
    }

    /// `static T name()` becomes `public static final T name`.
    fn convert_to_field(&self, method: &Method) -> Result<Field, DescriptorError> {
        let method_type = MethodType::parse(&method.descriptor)?.map_names(&self.renamer);
        Ok(Field {
            access: Access::PUBLIC | Access::STATIC | Access::FINAL,
            name: method.name.clone(),
            descriptor: method_type.return_type.to_string(),
            signature: None,
            constant: None,
            annotations: self.adapt_annotations(&method.annotations)?,
        })
    }

    fn adapt_annotations(&self, annotations: &[Annotation]) -> Result<Vec<Annotation>, DescriptorError> {
        annotations
            .iter()
            .filter(|annotation| annotation.visible)
            .map(|annotation| self.adapt_annotation(annotation))
            .collect()
    }

    fn adapt_annotation(&self, annotation: &Annotation) -> Result<Annotation, DescriptorError> {
        let elements = annotation
            .elements
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.adapt_element(value)?)))
            .collect::<Result<_, DescriptorError>>()?;
        Ok(Annotation {
            descriptor: rewrite_descriptor(&annotation.descriptor, &self.renamer)?,
            visible: annotation.visible,
            elements,
        })
    }

    fn adapt_element(&self, value: &ElementValue) -> Result<ElementValue, DescriptorError> {
        Ok(match value {
            ElementValue::Const { .. } => value.clone(),
            ElementValue::Enum { descriptor, name } => ElementValue::Enum {
                descriptor: rewrite_descriptor(descriptor, &self.renamer)?,
                name: name.clone(),
            },
            ElementValue::Class { descriptor } => ElementValue::Class {
                descriptor: rewrite_descriptor(descriptor, &self.renamer)?,
            },
            ElementValue::Annotation(annotation) => {
                ElementValue::Annotation(Box::new(self.adapt_annotation(annotation)?))
            }
            ElementValue::Array(values) => ElementValue::Array(
                values
                    .iter()
                    .map(|value| self.adapt_element(value))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIB: &str = "org/teavm/classlib/java/";

    fn adapter() -> Adapter {
        Adapter::new(&AdapterConfig::default()).expect("adapter")
    }

    fn lib(name: &str) -> String {
        format!("{LIB}{name}")
    }

    fn method(access: Access, name: &str, descriptor: &str) -> Method {
        Method {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: None,
            exceptions: Vec::new(),
            annotations: Vec::new(),
            annotation_default: None,
        }
    }

    fn kept(adapted: Adapted) -> (String, CompiledUnit) {
        match adapted {
            Adapted::Kept { name, unit } => (name, unit),
            Adapted::Suppressed(reason) => panic!("unexpectedly suppressed: {reason}"),
        }
    }

    #[test]
    fn renames_declaration_members_and_signatures() {
        let mut unit = CompiledUnit::new(lib("util/TArrayList"));
        unit.super_name = Some(lib("util/TAbstractList"));
        unit.interfaces = vec![lib("util/TList"), "java/io/Serializable".to_string()];
        unit.signature = Some(format!(
            "<E:Ljava/lang/Object;>L{LIB}util/TAbstractList<TE;>;L{LIB}util/TList<TE;>;"
        ));
        unit.methods.push(Method {
            exceptions: vec![lib("lang/TIllegalStateException")],
            ..method(
                Access::PUBLIC,
                "subList",
                &format!("(II)L{LIB}util/TList;"),
            )
        });

        let (name, adapted) = kept(adapter().adapt(&unit).expect("adapt"));
        assert_eq!(name, "java/util/ArrayList");
        assert_eq!(adapted.super_name.as_deref(), Some("java/util/AbstractList"));
        assert_eq!(
            adapted.interfaces,
            vec!["java/util/List".to_string(), "java/io/Serializable".to_string()]
        );
        assert_eq!(
            adapted.signature.as_deref(),
            Some("<E:Ljava/lang/Object;>Ljava/util/AbstractList<TE;>;Ljava/util/List<TE;>;")
        );
        assert_eq!(adapted.methods[0].descriptor, "(II)Ljava/util/List;");
        assert_eq!(
            adapted.methods[0].exceptions,
            vec!["java/lang/IllegalStateException".to_string()]
        );
    }

    #[test]
    fn package_private_and_excluded_units_are_suppressed() {
        let mut unit = CompiledUnit::new(lib("util/THelper"));
        unit.access = Access::SUPER;
        assert_eq!(
            adapter().adapt(&unit).expect("adapt"),
            Adapted::Suppressed(SuppressReason::NotExported)
        );

        // No marker: the name stays under the classlib prefix and is excluded.
        let unit = CompiledUnit::new(lib("util/Helper"));
        assert_eq!(
            adapter().adapt(&unit).expect("adapt"),
            Adapted::Suppressed(SuppressReason::Excluded {
                prefix: "org/teavm/classlib/".to_string(),
            })
        );
    }

    #[test]
    fn only_exported_members_survive() {
        let mut unit = CompiledUnit::new(lib("lang/TBox"));
        unit.methods = vec![
            method(Access::PUBLIC, "get", "()I"),
            method(Access::PROTECTED, "reset", "()V"),
            method(Access::empty(), "internal", "()V"),
            method(Access::PRIVATE, "secret", "()V"),
        ];
        let (_, adapted) = kept(adapter().adapt(&unit).expect("adapt"));
        let names: Vec<&str> = adapted.methods.iter().map(|method| method.name.as_str()).collect();
        assert_eq!(names, vec!["get", "reset"]);
    }

    #[test]
    fn supertype_overrides_and_self_inheritance_guard() {
        let mut throwable = CompiledUnit::new(lib("lang/TThrowable"));
        throwable.super_name = Some("java/lang/Object".to_string());
        let (_, adapted) = kept(adapter().adapt(&throwable).expect("adapt"));
        assert_eq!(adapted.super_name.as_deref(), Some("java/lang/Object"));

        let mut runtime = CompiledUnit::new(lib("lang/TRuntimeException"));
        runtime.super_name = Some(lib("lang/TThrowable"));
        let (_, adapted) = kept(adapter().adapt(&runtime).expect("adapt"));
        assert_eq!(adapted.super_name.as_deref(), Some("java/lang/Exception"));

        let mut object = CompiledUnit::new(lib("lang/TObject"));
        object.super_name = Some("java/lang/Object".to_string());
        let (_, adapted) = kept(adapter().adapt(&object).expect("adapt"));
        assert_eq!(adapted.super_name, None);
    }

    #[test]
    fn only_visible_annotations_are_kept_and_renamed() {
        let mut unit = CompiledUnit::new(lib("lang/TString"));
        unit.annotations = vec![
            Annotation {
                descriptor: format!("L{LIB}lang/TDeprecated;"),
                visible: true,
                elements: vec![(
                    "kind".to_string(),
                    ElementValue::Class {
                        descriptor: format!("L{LIB}lang/TObject;"),
                    },
                )],
            },
            Annotation {
                descriptor: "Lorg/teavm/interop/Rename;".to_string(),
                visible: false,
                elements: Vec::new(),
            },
        ];
        let (_, adapted) = kept(adapter().adapt(&unit).expect("adapt"));
        assert_eq!(adapted.annotations.len(), 1);
        assert_eq!(adapted.annotations[0].descriptor, "Ljava/lang/Deprecated;");
        assert_eq!(
            adapted.annotations[0].elements[0].1,
            ElementValue::Class {
                descriptor: "Ljava/lang/Object;".to_string(),
            }
        );
    }

    #[test]
    fn system_streams_become_fields() {
        let mut unit = CompiledUnit::new(lib("lang/TSystem"));
        unit.methods = vec![
            method(
                Access::PUBLIC | Access::STATIC,
                "out",
                &format!("()L{LIB}io/TPrintStream;"),
            ),
            method(Access::PUBLIC | Access::STATIC, "exit", "(I)V"),
        ];
        let (_, adapted) = kept(adapter().adapt(&unit).expect("adapt"));
        assert_eq!(adapted.methods.len(), 1);
        assert_eq!(adapted.fields.len(), 1);
        let field = &adapted.fields[0];
        assert_eq!(field.name, "out");
        assert_eq!(field.descriptor, "Ljava/io/PrintStream;");
        assert_eq!(field.access, Access::PUBLIC | Access::STATIC | Access::FINAL);
    }

    #[test]
    fn malformed_member_descriptor_fails_the_unit() {
        let mut unit = CompiledUnit::new(lib("lang/TBroken"));
        unit.fields.push(Field {
            access: Access::PUBLIC,
            name: "value".to_string(),
            descriptor: "Ljava/lang/String".to_string(),
            signature: None,
            constant: None,
            annotations: Vec::new(),
        });
        assert!(adapter().adapt(&unit).is_err());
    }
}
