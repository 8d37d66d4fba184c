//! Class-file codec for compiled units.
//!
//! The reader keeps only the structure the renaming pass needs; the writer
//! rebuilds a constant pool from scratch, so renamed strings of any length
//! never require patching bytes in place.

mod mutf8;
pub mod reader;
pub mod writer;

pub use reader::decode_unit;
pub use writer::{encode_module_descriptor, encode_unit};

pub(crate) const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Constant pool tags.
pub(crate) mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// Attribute names.
pub(crate) mod attribute {
    pub const SIGNATURE: &str = "Signature";
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
    pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
    pub const INNER_CLASSES: &str = "InnerClasses";
    pub const CONSTANT_VALUE: &str = "ConstantValue";
    pub const EXCEPTIONS: &str = "Exceptions";
    pub const ANNOTATION_DEFAULT: &str = "AnnotationDefault";
    pub const MODULE: &str = "Module";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{
        Access, Annotation, CompiledUnit, ConstantValue, ElementValue, Field, InnerClass, Method,
    };

    fn sample_unit() -> CompiledUnit {
        let mut unit = CompiledUnit::new("java/util/Sample");
        unit.interfaces.push("java/lang/Comparable".to_string());
        unit.signature = Some("Ljava/lang/Object;Ljava/lang/Comparable<Ljava/util/Sample;>;".to_string());
        unit.annotations.push(Annotation {
            descriptor: "Ljava/lang/Deprecated;".to_string(),
            visible: true,
            elements: vec![(
                "since".to_string(),
                ElementValue::Const {
                    tag: b's',
                    value: ConstantValue::String("9".to_string()),
                },
            )],
        });
        unit.fields.push(Field {
            access: Access::PUBLIC | Access::STATIC | Access::FINAL,
            name: "MAX".to_string(),
            descriptor: "J".to_string(),
            signature: None,
            constant: Some(ConstantValue::Long(1 << 40)),
            annotations: Vec::new(),
        });
        unit.fields.push(Field {
            access: Access::PUBLIC | Access::STATIC | Access::FINAL,
            name: "RATIO".to_string(),
            descriptor: "D".to_string(),
            signature: None,
            constant: Some(ConstantValue::Double(0.5)),
            annotations: Vec::new(),
        });
        unit.methods.push(Method {
            access: Access::PUBLIC,
            name: "compareTo".to_string(),
            descriptor: "(Ljava/util/Sample;)I".to_string(),
            signature: None,
            exceptions: vec!["java/lang/IllegalStateException".to_string()],
            annotations: vec![Annotation {
                descriptor: "Ljava/lang/Hidden;".to_string(),
                visible: false,
                elements: vec![(
                    "value".to_string(),
                    ElementValue::Array(vec![
                        ElementValue::Enum {
                            descriptor: "Ljava/lang/Level;".to_string(),
                            name: "HIGH".to_string(),
                        },
                        ElementValue::Class {
                            descriptor: "Ljava/lang/String;".to_string(),
                        },
                    ]),
                )],
            }],
            annotation_default: None,
        });
        unit.methods.push(Method {
            access: Access::PUBLIC | Access::ABSTRACT,
            name: "limit".to_string(),
            descriptor: "()I".to_string(),
            signature: None,
            exceptions: Vec::new(),
            annotations: Vec::new(),
            annotation_default: Some(ElementValue::Const {
                tag: b'I',
                value: ConstantValue::Int(7),
            }),
        });
        unit.inner_classes.push(InnerClass {
            name: "java/util/Sample$Entry".to_string(),
            outer_name: Some("java/util/Sample".to_string()),
            simple_name: Some("Entry".to_string()),
            access: Access::PUBLIC | Access::STATIC,
        });
        unit
    }

    #[test]
    fn encoded_unit_decodes_to_the_same_model() {
        let unit = sample_unit();
        let bytes = encode_unit(&unit).expect("encode");
        let decoded = decode_unit(&bytes).expect("decode");
        assert_eq!(decoded, unit);
    }

    #[test]
    fn encoding_is_deterministic() {
        let unit = sample_unit();
        assert_eq!(
            encode_unit(&unit).expect("encode"),
            encode_unit(&unit).expect("encode")
        );
    }

    #[test]
    fn encoded_unit_is_accepted_by_jclassfile() {
        let bytes = encode_unit(&sample_unit()).expect("encode");
        jclassfile::class_file::parse(&bytes).expect("parse");
    }

    #[test]
    fn module_descriptor_has_module_flag_and_version() {
        let packages = vec!["java/lang".to_string(), "java/util".to_string()];
        let bytes = encode_module_descriptor("java.base", &packages).expect("encode");
        assert_eq!(&bytes[..4], &CLASS_MAGIC.to_be_bytes());
        assert_eq!(u16::from_be_bytes([bytes[6], bytes[7]]), 53);
        let decoded = decode_unit(&bytes).expect("decode");
        assert_eq!(decoded.name, "module-info");
        assert_eq!(decoded.access, Access::MODULE);
        assert_eq!(decoded.super_name, None);
        assert!(decoded.fields.is_empty() && decoded.methods.is_empty());
    }

    #[test]
    fn module_descriptor_outside_base_requires_java_base() {
        let base = encode_module_descriptor("java.base", &[]).expect("encode");
        let other = encode_module_descriptor("app", &[]).expect("encode");
        let needle = b"java.base";
        assert!(base.windows(needle.len()).any(|window| window == needle));
        assert!(other.windows(needle.len()).any(|window| window == needle));
        // requires entry: module index, flags, version index.
        assert!(other.len() > base.len());
    }
}
