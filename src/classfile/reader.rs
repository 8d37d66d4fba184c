use log::{debug, trace};

use crate::classfile::{attribute, mutf8, tag, CLASS_MAGIC};
use crate::error::ClassFileError;
use crate::unit::{
    Access, Annotation, CompiledUnit, ConstantValue, ElementValue, Field, InnerClass, Method,
};

type Result<T> = std::result::Result<T, ClassFileError>;

/// API metadata the unit model does not carry. Dropping these is logged;
/// code and debug attributes are skipped quietly.
const DROPPED_METADATA: &[&str] = &[
    "RuntimeVisibleParameterAnnotations",
    "RuntimeInvisibleParameterAnnotations",
    "RuntimeVisibleTypeAnnotations",
    "RuntimeInvisibleTypeAnnotations",
    "MethodParameters",
    "EnclosingMethod",
    "NestHost",
    "NestMembers",
    "PermittedSubclasses",
    "Record",
];

fn is_dropped_metadata(attribute_name: &str) -> bool {
    DROPPED_METADATA.contains(&attribute_name)
}

fn skip_attribute(owner: &str, member: Option<&str>, attribute_name: &str) {
    let member = member.map(|member| format!(".{member}")).unwrap_or_default();
    if is_dropped_metadata(attribute_name) {
        debug!("{owner}{member}: dropping {attribute_name} attribute");
    } else {
        trace!("{owner}{member}: skipping {attribute_name} attribute");
    }
}

/// Constant pool entries the renaming pass needs; everything else is kept as
/// an opaque placeholder so indices stay aligned.
#[derive(Clone, Debug)]
enum PoolEntry {
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    Other,
}

/// Decodes a class file into a [`CompiledUnit`].
///
/// Code, stack maps and debug attributes are skipped: the unit is consumed as
/// a symbol table, never executed.
pub fn decode_unit(data: &[u8]) -> Result<CompiledUnit> {
    let mut offset = 0usize;
    let magic = read_u32(data, &mut offset)?;
    if magic != CLASS_MAGIC {
        return Err(ClassFileError::BadMagic(magic));
    }
    let minor_version = read_u16(data, &mut offset)?;
    let major_version = read_u16(data, &mut offset)?;
    let pool = read_constant_pool(data, &mut offset)?;
    let access = Access::from_bits_retain(read_u16(data, &mut offset)?);
    let this_class = read_u16(data, &mut offset)?;
    let super_class = read_u16(data, &mut offset)?;

    let name = class_name(&pool, this_class)?;
    let super_name = if super_class == 0 {
        None
    } else {
        Some(class_name(&pool, super_class)?)
    };

    let interface_count = read_u16(data, &mut offset)?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let index = read_u16(data, &mut offset)?;
        interfaces.push(class_name(&pool, index)?);
    }

    let field_count = read_u16(data, &mut offset)?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(read_field(data, &mut offset, &pool, &name)?);
    }

    let method_count = read_u16(data, &mut offset)?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        methods.push(read_method(data, &mut offset, &pool, &name)?);
    }

    let mut unit = CompiledUnit {
        minor_version,
        major_version,
        access,
        name,
        super_name,
        interfaces,
        signature: None,
        fields,
        methods,
        annotations: Vec::new(),
        inner_classes: Vec::new(),
    };

    let attribute_count = read_u16(data, &mut offset)?;
    for _ in 0..attribute_count {
        let (attribute_name, body) = read_attribute(data, &mut offset, &pool)?;
        let mut cursor = 0usize;
        match attribute_name.as_str() {
            attribute::SIGNATURE => {
                unit.signature = Some(utf8(&pool, read_u16(body, &mut cursor)?)?);
            }
            attribute::RUNTIME_VISIBLE_ANNOTATIONS => {
                unit.annotations
                    .extend(read_annotations(body, &mut cursor, &pool, true)?);
            }
            attribute::RUNTIME_INVISIBLE_ANNOTATIONS => {
                unit.annotations
                    .extend(read_annotations(body, &mut cursor, &pool, false)?);
            }
            attribute::INNER_CLASSES => {
                unit.inner_classes = read_inner_classes(body, &mut cursor, &pool)?;
            }
            other => skip_attribute(&unit.name, None, other),
        }
    }

    if offset != data.len() {
        return Err(ClassFileError::TrailingData {
            count: data.len() - offset,
        });
    }
    Ok(unit)
}

fn read_constant_pool(data: &[u8], offset: &mut usize) -> Result<Vec<PoolEntry>> {
    let count = read_u16(data, offset)?;
    let mut entries = Vec::with_capacity(count as usize);
    entries.push(PoolEntry::Unusable);
    let mut index = 1u16;
    while index < count {
        let entry_tag = read_u8(data, offset)?;
        match entry_tag {
            tag::UTF8 => {
                let len = read_u16(data, offset)? as usize;
                let bytes = read_bytes(data, offset, len)?;
                let value = mutf8::decode(bytes).ok_or(ClassFileError::InvalidUtf8 { index })?;
                entries.push(PoolEntry::Utf8(value));
            }
            tag::INTEGER => entries.push(PoolEntry::Integer(read_u32(data, offset)? as i32)),
            tag::FLOAT => {
                entries.push(PoolEntry::Float(f32::from_bits(read_u32(data, offset)?)));
            }
            tag::LONG | tag::DOUBLE => {
                let high = read_u32(data, offset)? as u64;
                let low = read_u32(data, offset)? as u64;
                let bits = (high << 32) | low;
                if entry_tag == tag::LONG {
                    entries.push(PoolEntry::Long(bits as i64));
                } else {
                    entries.push(PoolEntry::Double(f64::from_bits(bits)));
                }
                // Eight-byte constants occupy two slots.
                entries.push(PoolEntry::Unusable);
                index += 1;
            }
            tag::CLASS => entries.push(PoolEntry::Class(read_u16(data, offset)?)),
            tag::STRING => entries.push(PoolEntry::String(read_u16(data, offset)?)),
            tag::FIELDREF
            | tag::METHODREF
            | tag::INTERFACE_METHODREF
            | tag::NAME_AND_TYPE
            | tag::DYNAMIC
            | tag::INVOKE_DYNAMIC => {
                skip_bytes(data, offset, 4)?;
                entries.push(PoolEntry::Other);
            }
            tag::METHOD_HANDLE => {
                skip_bytes(data, offset, 3)?;
                entries.push(PoolEntry::Other);
            }
            tag::METHOD_TYPE | tag::MODULE | tag::PACKAGE => {
                skip_bytes(data, offset, 2)?;
                entries.push(PoolEntry::Other);
            }
            _ => {
                return Err(ClassFileError::UnknownConstantTag {
                    tag: entry_tag,
                    index,
                });
            }
        }
        index += 1;
    }
    Ok(entries)
}

fn read_field(data: &[u8], offset: &mut usize, pool: &[PoolEntry], owner: &str) -> Result<Field> {
    let access = Access::from_bits_retain(read_u16(data, offset)?);
    let name = utf8(pool, read_u16(data, offset)?)?;
    let descriptor = utf8(pool, read_u16(data, offset)?)?;
    let mut field = Field {
        access,
        name,
        descriptor,
        signature: None,
        constant: None,
        annotations: Vec::new(),
    };
    let attribute_count = read_u16(data, offset)?;
    for _ in 0..attribute_count {
        let (attribute_name, body) = read_attribute(data, offset, pool)?;
        let mut cursor = 0usize;
        match attribute_name.as_str() {
            attribute::CONSTANT_VALUE => {
                field.constant = Some(constant_value(pool, read_u16(body, &mut cursor)?)?);
            }
            attribute::SIGNATURE => {
                field.signature = Some(utf8(pool, read_u16(body, &mut cursor)?)?);
            }
            attribute::RUNTIME_VISIBLE_ANNOTATIONS => {
                field
                    .annotations
                    .extend(read_annotations(body, &mut cursor, pool, true)?);
            }
            attribute::RUNTIME_INVISIBLE_ANNOTATIONS => {
                field
                    .annotations
                    .extend(read_annotations(body, &mut cursor, pool, false)?);
            }
            other => skip_attribute(owner, Some(&field.name), other),
        }
    }
    Ok(field)
}

fn read_method(data: &[u8], offset: &mut usize, pool: &[PoolEntry], owner: &str) -> Result<Method> {
    let access = Access::from_bits_retain(read_u16(data, offset)?);
    let name = utf8(pool, read_u16(data, offset)?)?;
    let descriptor = utf8(pool, read_u16(data, offset)?)?;
    let mut method = Method {
        access,
        name,
        descriptor,
        signature: None,
        exceptions: Vec::new(),
        annotations: Vec::new(),
        annotation_default: None,
    };
    let attribute_count = read_u16(data, offset)?;
    for _ in 0..attribute_count {
        let (attribute_name, body) = read_attribute(data, offset, pool)?;
        let mut cursor = 0usize;
        match attribute_name.as_str() {
            attribute::SIGNATURE => {
                method.signature = Some(utf8(pool, read_u16(body, &mut cursor)?)?);
            }
            attribute::EXCEPTIONS => {
                let count = read_u16(body, &mut cursor)?;
                for _ in 0..count {
                    let index = read_u16(body, &mut cursor)?;
                    method.exceptions.push(class_name(pool, index)?);
                }
            }
            attribute::ANNOTATION_DEFAULT => {
                method.annotation_default = Some(read_element_value(body, &mut cursor, pool)?);
            }
            attribute::RUNTIME_VISIBLE_ANNOTATIONS => {
                method
                    .annotations
                    .extend(read_annotations(body, &mut cursor, pool, true)?);
            }
            attribute::RUNTIME_INVISIBLE_ANNOTATIONS => {
                method
                    .annotations
                    .extend(read_annotations(body, &mut cursor, pool, false)?);
            }
            other => skip_attribute(owner, Some(&method.name), other),
        }
    }
    Ok(method)
}

fn read_attribute<'a>(
    data: &'a [u8],
    offset: &mut usize,
    pool: &[PoolEntry],
) -> Result<(String, &'a [u8])> {
    let name = utf8(pool, read_u16(data, offset)?)?;
    let len = read_u32(data, offset)? as usize;
    let body = read_bytes(data, offset, len)?;
    Ok((name, body))
}

fn read_inner_classes(
    data: &[u8],
    offset: &mut usize,
    pool: &[PoolEntry],
) -> Result<Vec<InnerClass>> {
    let count = read_u16(data, offset)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = class_name(pool, read_u16(data, offset)?)?;
        let outer_index = read_u16(data, offset)?;
        let simple_index = read_u16(data, offset)?;
        let access = Access::from_bits_retain(read_u16(data, offset)?);
        entries.push(InnerClass {
            name,
            outer_name: optional(outer_index, |index| class_name(pool, index))?,
            simple_name: optional(simple_index, |index| utf8(pool, index))?,
            access,
        });
    }
    Ok(entries)
}

fn optional<T>(index: u16, resolve: impl FnOnce(u16) -> Result<T>) -> Result<Option<T>> {
    if index == 0 { Ok(None) } else { resolve(index).map(Some) }
}

fn read_annotations(
    data: &[u8],
    offset: &mut usize,
    pool: &[PoolEntry],
    visible: bool,
) -> Result<Vec<Annotation>> {
    let count = read_u16(data, offset)?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(read_annotation(data, offset, pool, visible)?);
    }
    Ok(annotations)
}

fn read_annotation(
    data: &[u8],
    offset: &mut usize,
    pool: &[PoolEntry],
    visible: bool,
) -> Result<Annotation> {
    let descriptor = utf8(pool, read_u16(data, offset)?)?;
    let pair_count = read_u16(data, offset)?;
    let mut elements = Vec::with_capacity(pair_count as usize);
    for _ in 0..pair_count {
        let name = utf8(pool, read_u16(data, offset)?)?;
        let value = read_element_value_with(data, offset, pool, visible)?;
        elements.push((name, value));
    }
    Ok(Annotation {
        descriptor,
        visible,
        elements,
    })
}

fn read_element_value(data: &[u8], offset: &mut usize, pool: &[PoolEntry]) -> Result<ElementValue> {
    read_element_value_with(data, offset, pool, true)
}

fn read_element_value_with(
    data: &[u8],
    offset: &mut usize,
    pool: &[PoolEntry],
    visible: bool,
) -> Result<ElementValue> {
    let value_tag = read_u8(data, offset)?;
    let value = match value_tag {
        b'B' | b'C' | b'I' | b'S' | b'Z' | b'D' | b'F' | b'J' => {
            let index = read_u16(data, offset)?;
            ElementValue::Const {
                tag: value_tag,
                value: constant_value(pool, index)?,
            }
        }
        b's' => {
            let index = read_u16(data, offset)?;
            ElementValue::Const {
                tag: value_tag,
                value: ConstantValue::String(utf8(pool, index)?),
            }
        }
        b'e' => {
            let descriptor = utf8(pool, read_u16(data, offset)?)?;
            let name = utf8(pool, read_u16(data, offset)?)?;
            ElementValue::Enum { descriptor, name }
        }
        b'c' => ElementValue::Class {
            descriptor: utf8(pool, read_u16(data, offset)?)?,
        },
        b'@' => ElementValue::Annotation(Box::new(read_annotation(data, offset, pool, visible)?)),
        b'[' => {
            let count = read_u16(data, offset)?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(read_element_value_with(data, offset, pool, visible)?);
            }
            ElementValue::Array(values)
        }
        other => return Err(ClassFileError::UnknownElementTag(other as char)),
    };
    Ok(value)
}

fn constant_value(pool: &[PoolEntry], index: u16) -> Result<ConstantValue> {
    match pool.get(index as usize) {
        Some(PoolEntry::Integer(value)) => Ok(ConstantValue::Int(*value)),
        Some(PoolEntry::Float(value)) => Ok(ConstantValue::Float(*value)),
        Some(PoolEntry::Long(value)) => Ok(ConstantValue::Long(*value)),
        Some(PoolEntry::Double(value)) => Ok(ConstantValue::Double(*value)),
        Some(PoolEntry::String(string_index)) => Ok(ConstantValue::String(utf8(pool, *string_index)?)),
        _ => Err(ClassFileError::BadConstantRef {
            index,
            expected: "constant value",
        }),
    }
}

fn class_name(pool: &[PoolEntry], index: u16) -> Result<String> {
    match pool.get(index as usize) {
        Some(PoolEntry::Class(name_index)) => utf8(pool, *name_index),
        _ => Err(ClassFileError::BadConstantRef {
            index,
            expected: "class",
        }),
    }
}

fn utf8(pool: &[PoolEntry], index: u16) -> Result<String> {
    match pool.get(index as usize) {
        Some(PoolEntry::Utf8(value)) => Ok(value.clone()),
        _ => Err(ClassFileError::BadConstantRef {
            index,
            expected: "utf8",
        }),
    }
}

fn read_u8(data: &[u8], offset: &mut usize) -> Result<u8> {
    Ok(read_bytes(data, offset, 1)?[0])
}

fn read_u16(data: &[u8], offset: &mut usize) -> Result<u16> {
    let bytes = read_bytes(data, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    let bytes = read_bytes(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_bytes<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = offset
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or(ClassFileError::Truncated {
            offset: *offset,
            needed: len,
        })?;
    let bytes = &data[*offset..end];
    *offset = end;
    Ok(bytes)
}

fn skip_bytes(data: &[u8], offset: &mut usize, len: usize) -> Result<()> {
    read_bytes(data, offset, len).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let error = decode_unit(&[0xCA, 0xFE, 0xBA, 0xBF, 0, 0, 0, 52]).expect_err("bad magic");
        assert_eq!(error, ClassFileError::BadMagic(0xCAFE_BABF));
    }

    #[test]
    fn rejects_truncated_input() {
        let error = decode_unit(b"nope").expect_err("truncated");
        assert!(matches!(
            error,
            ClassFileError::BadMagic(_) | ClassFileError::Truncated { .. }
        ));
        let error = decode_unit(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0]).expect_err("truncated");
        assert!(matches!(error, ClassFileError::Truncated { offset: 6, .. }));
    }

    #[test]
    fn rejects_unknown_constant_tag() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52, 0, 2, 99];
        let error = decode_unit(&data).expect_err("unknown tag");
        assert_eq!(error, ClassFileError::UnknownConstantTag { tag: 99, index: 1 });
    }

    fn utf8_entry(out: &mut Vec<u8>, value: &str) {
        out.push(tag::UTF8);
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
        out.extend_from_slice(value.as_bytes());
    }

    #[test]
    fn nest_host_is_dropped_without_failing_the_unit() {
        let mut data = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 55, 0, 6];
        utf8_entry(&mut data, "a/Outer$Inner");
        data.extend_from_slice(&[tag::CLASS, 0, 1]);
        utf8_entry(&mut data, "NestHost");
        utf8_entry(&mut data, "a/Outer");
        data.extend_from_slice(&[tag::CLASS, 0, 4]);
        // public super, this #2, no super, no interfaces, fields or methods
        data.extend_from_slice(&[0, 0x21, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0]);
        data.extend_from_slice(&[0, 1, 0, 3, 0, 0, 0, 2, 0, 5]);

        let unit = decode_unit(&data).expect("decode");
        assert_eq!(unit.name, "a/Outer$Inner");
        assert_eq!(unit.super_name, None);
        assert!(unit.inner_classes.is_empty());
    }

    #[test]
    fn api_metadata_is_told_apart_from_code_attributes() {
        for name in ["RuntimeVisibleParameterAnnotations", "EnclosingMethod", "NestHost"] {
            assert!(is_dropped_metadata(name), "{name}");
        }
        for name in ["Code", "LineNumberTable", "SourceFile"] {
            assert!(!is_dropped_metadata(name), "{name}");
        }
    }
}
