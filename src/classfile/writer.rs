use std::collections::HashMap;

use crate::classfile::{attribute, mutf8, tag, CLASS_MAGIC};
use crate::error::ClassFileError;
use crate::unit::{
    Access, Annotation, CompiledUnit, ConstantValue, ElementValue, Field, InnerClass, Method,
};

type Result<T> = std::result::Result<T, ClassFileError>;

/// Class-file major version required for module descriptors.
const MODULE_MAJOR_VERSION: u16 = 53;
const ACC_MANDATED: u16 = 0x8000;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
enum PoolKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    Module(u16),
    Package(u16),
}

/// Deduplicating constant pool builder.
#[derive(Default)]
struct ConstantPool {
    bytes: Vec<u8>,
    indices: HashMap<PoolKey, u16>,
    next: u16,
}

impl ConstantPool {
    fn new() -> Self {
        ConstantPool {
            next: 1,
            ..ConstantPool::default()
        }
    }

    fn insert(&mut self, key: PoolKey) -> Result<u16> {
        if let Some(index) = self.indices.get(&key) {
            return Ok(*index);
        }
        let slots = match key {
            PoolKey::Long(_) | PoolKey::Double(_) => 2,
            _ => 1,
        };
        let index = self.next;
        let next = index as u32 + slots;
        if next > u16::MAX as u32 {
            return Err(ClassFileError::TooMany {
                what: "constant pool",
                count: next as usize,
            });
        }
        match &key {
            PoolKey::Utf8(value) => {
                let encoded = mutf8::encode(value);
                let len = u16::try_from(encoded.len()).map_err(|_| ClassFileError::TooMany {
                    what: "utf8 length",
                    count: encoded.len(),
                })?;
                self.bytes.push(tag::UTF8);
                self.bytes.extend_from_slice(&len.to_be_bytes());
                self.bytes.extend_from_slice(&encoded);
            }
            PoolKey::Integer(value) => {
                self.bytes.push(tag::INTEGER);
                self.bytes.extend_from_slice(&value.to_be_bytes());
            }
            PoolKey::Float(bits) => {
                self.bytes.push(tag::FLOAT);
                self.bytes.extend_from_slice(&bits.to_be_bytes());
            }
            PoolKey::Long(value) => {
                self.bytes.push(tag::LONG);
                self.bytes.extend_from_slice(&value.to_be_bytes());
            }
            PoolKey::Double(bits) => {
                self.bytes.push(tag::DOUBLE);
                self.bytes.extend_from_slice(&bits.to_be_bytes());
            }
            PoolKey::Class(name) => self.push_ref(tag::CLASS, *name),
            PoolKey::String(value) => self.push_ref(tag::STRING, *value),
            PoolKey::Module(name) => self.push_ref(tag::MODULE, *name),
            PoolKey::Package(name) => self.push_ref(tag::PACKAGE, *name),
        }
        self.next = next as u16;
        self.indices.insert(key, index);
        Ok(index)
    }

    fn push_ref(&mut self, entry_tag: u8, index: u16) {
        self.bytes.push(entry_tag);
        self.bytes.extend_from_slice(&index.to_be_bytes());
    }

    fn utf8(&mut self, value: &str) -> Result<u16> {
        self.insert(PoolKey::Utf8(value.to_string()))
    }

    fn class(&mut self, name: &str) -> Result<u16> {
        let name_index = self.utf8(name)?;
        self.insert(PoolKey::Class(name_index))
    }

    fn constant(&mut self, value: &ConstantValue) -> Result<u16> {
        match value {
            ConstantValue::Int(value) => self.insert(PoolKey::Integer(*value)),
            ConstantValue::Long(value) => self.insert(PoolKey::Long(*value)),
            ConstantValue::Float(value) => self.insert(PoolKey::Float(value.to_bits())),
            ConstantValue::Double(value) => self.insert(PoolKey::Double(value.to_bits())),
            ConstantValue::String(value) => {
                let utf8 = self.utf8(value)?;
                self.insert(PoolKey::String(utf8))
            }
        }
    }
}

/// Encodes a unit into class-file bytes with a freshly built constant pool.
pub fn encode_unit(unit: &CompiledUnit) -> Result<Vec<u8>> {
    let mut pool = ConstantPool::new();
    let mut body = Vec::new();

    put_u16(&mut body, unit.access.bits());
    put_u16(&mut body, pool.class(&unit.name)?);
    match &unit.super_name {
        Some(super_name) => put_u16(&mut body, pool.class(super_name)?),
        None => put_u16(&mut body, 0),
    }
    put_count(&mut body, unit.interfaces.len(), "interfaces")?;
    for interface in &unit.interfaces {
        put_u16(&mut body, pool.class(interface)?);
    }

    put_count(&mut body, unit.fields.len(), "fields")?;
    for field in &unit.fields {
        write_field(&mut body, &mut pool, field)?;
    }
    put_count(&mut body, unit.methods.len(), "methods")?;
    for method in &unit.methods {
        write_method(&mut body, &mut pool, method)?;
    }

    let mut attributes = Vec::new();
    if let Some(signature) = &unit.signature {
        attributes.push(signature_attribute(&mut pool, signature)?);
    }
    attributes.extend(annotation_attributes(&mut pool, &unit.annotations)?);
    if !unit.inner_classes.is_empty() {
        attributes.push(inner_classes_attribute(&mut pool, &unit.inner_classes)?);
    }
    put_attributes(&mut body, attributes)?;

    Ok(assemble(unit.minor_version, unit.major_version, pool, body))
}

/// Encodes a `module-info` unit exporting every package unconditionally.
pub fn encode_module_descriptor(module_name: &str, packages: &[String]) -> Result<Vec<u8>> {
    let mut pool = ConstantPool::new();
    let mut body = Vec::new();

    put_u16(&mut body, Access::MODULE.bits());
    put_u16(&mut body, pool.class("module-info")?);
    put_u16(&mut body, 0);
    put_u16(&mut body, 0);
    put_u16(&mut body, 0);
    put_u16(&mut body, 0);

    let mut module = Vec::new();
    let name_index = pool.utf8(module_name)?;
    put_u16(&mut module, pool.insert(PoolKey::Module(name_index))?);
    put_u16(&mut module, 0);
    put_u16(&mut module, 0);
    if module_name == "java.base" {
        put_u16(&mut module, 0);
    } else {
        put_u16(&mut module, 1);
        let base_index = pool.utf8("java.base")?;
        put_u16(&mut module, pool.insert(PoolKey::Module(base_index))?);
        put_u16(&mut module, ACC_MANDATED);
        put_u16(&mut module, 0);
    }
    put_count(&mut module, packages.len(), "exports")?;
    for package in packages {
        let package_index = pool.utf8(package)?;
        put_u16(&mut module, pool.insert(PoolKey::Package(package_index))?);
        put_u16(&mut module, 0);
        put_u16(&mut module, 0);
    }
    // opens, uses, provides
    put_u16(&mut module, 0);
    put_u16(&mut module, 0);
    put_u16(&mut module, 0);

    let attribute = (pool.utf8(attribute::MODULE)?, module);
    put_attributes(&mut body, vec![attribute])?;

    Ok(assemble(0, MODULE_MAJOR_VERSION, pool, body))
}

fn assemble(minor_version: u16, major_version: u16, pool: ConstantPool, body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(10 + pool.bytes.len() + body.len());
    out.extend_from_slice(&CLASS_MAGIC.to_be_bytes());
    put_u16(&mut out, minor_version);
    put_u16(&mut out, major_version);
    put_u16(&mut out, pool.next);
    out.extend_from_slice(&pool.bytes);
    out.extend_from_slice(&body);
    out
}

fn write_field(out: &mut Vec<u8>, pool: &mut ConstantPool, field: &Field) -> Result<()> {
    put_u16(out, field.access.bits());
    put_u16(out, pool.utf8(&field.name)?);
    put_u16(out, pool.utf8(&field.descriptor)?);
    let mut attributes = Vec::new();
    if let Some(constant) = &field.constant {
        let mut body = Vec::new();
        put_u16(&mut body, pool.constant(constant)?);
        attributes.push((pool.utf8(attribute::CONSTANT_VALUE)?, body));
    }
    if let Some(signature) = &field.signature {
        attributes.push(signature_attribute(pool, signature)?);
    }
    attributes.extend(annotation_attributes(pool, &field.annotations)?);
    put_attributes(out, attributes)
}

fn write_method(out: &mut Vec<u8>, pool: &mut ConstantPool, method: &Method) -> Result<()> {
    put_u16(out, method.access.bits());
    put_u16(out, pool.utf8(&method.name)?);
    put_u16(out, pool.utf8(&method.descriptor)?);
    let mut attributes = Vec::new();
    if !method.exceptions.is_empty() {
        let mut body = Vec::new();
        put_count(&mut body, method.exceptions.len(), "exceptions")?;
        for exception in &method.exceptions {
            put_u16(&mut body, pool.class(exception)?);
        }
        attributes.push((pool.utf8(attribute::EXCEPTIONS)?, body));
    }
    if let Some(signature) = &method.signature {
        attributes.push(signature_attribute(pool, signature)?);
    }
    if let Some(default) = &method.annotation_default {
        let mut body = Vec::new();
        write_element_value(&mut body, pool, default)?;
        attributes.push((pool.utf8(attribute::ANNOTATION_DEFAULT)?, body));
    }
    attributes.extend(annotation_attributes(pool, &method.annotations)?);
    put_attributes(out, attributes)
}

fn signature_attribute(pool: &mut ConstantPool, signature: &str) -> Result<(u16, Vec<u8>)> {
    let mut body = Vec::new();
    put_u16(&mut body, pool.utf8(signature)?);
    Ok((pool.utf8(attribute::SIGNATURE)?, body))
}

fn inner_classes_attribute(
    pool: &mut ConstantPool,
    inner_classes: &[InnerClass],
) -> Result<(u16, Vec<u8>)> {
    let mut body = Vec::new();
    put_count(&mut body, inner_classes.len(), "inner classes")?;
    for inner in inner_classes {
        put_u16(&mut body, pool.class(&inner.name)?);
        match &inner.outer_name {
            Some(outer) => put_u16(&mut body, pool.class(outer)?),
            None => put_u16(&mut body, 0),
        }
        match &inner.simple_name {
            Some(simple) => put_u16(&mut body, pool.utf8(simple)?),
            None => put_u16(&mut body, 0),
        }
        put_u16(&mut body, inner.access.bits());
    }
    Ok((pool.utf8(attribute::INNER_CLASSES)?, body))
}

fn annotation_attributes(
    pool: &mut ConstantPool,
    annotations: &[Annotation],
) -> Result<Vec<(u16, Vec<u8>)>> {
    let mut attributes = Vec::new();
    for (visible, name) in [
        (true, attribute::RUNTIME_VISIBLE_ANNOTATIONS),
        (false, attribute::RUNTIME_INVISIBLE_ANNOTATIONS),
    ] {
        let selected: Vec<&Annotation> = annotations
            .iter()
            .filter(|annotation| annotation.visible == visible)
            .collect();
        if selected.is_empty() {
            continue;
        }
        let mut body = Vec::new();
        put_count(&mut body, selected.len(), "annotations")?;
        for annotation in selected {
            write_annotation(&mut body, pool, annotation)?;
        }
        attributes.push((pool.utf8(name)?, body));
    }
    Ok(attributes)
}

fn write_annotation(out: &mut Vec<u8>, pool: &mut ConstantPool, annotation: &Annotation) -> Result<()> {
    put_u16(out, pool.utf8(&annotation.descriptor)?);
    put_count(out, annotation.elements.len(), "annotation elements")?;
    for (name, value) in &annotation.elements {
        put_u16(out, pool.utf8(name)?);
        write_element_value(out, pool, value)?;
    }
    Ok(())
}

fn write_element_value(out: &mut Vec<u8>, pool: &mut ConstantPool, value: &ElementValue) -> Result<()> {
    match value {
        ElementValue::Const {
            tag: b's',
            value: ConstantValue::String(text),
        } => {
            out.push(b's');
            put_u16(out, pool.utf8(text)?);
        }
        ElementValue::Const { tag, value } => {
            out.push(*tag);
            put_u16(out, pool.constant(value)?);
        }
        ElementValue::Enum { descriptor, name } => {
            out.push(b'e');
            put_u16(out, pool.utf8(descriptor)?);
            put_u16(out, pool.utf8(name)?);
        }
        ElementValue::Class { descriptor } => {
            out.push(b'c');
            put_u16(out, pool.utf8(descriptor)?);
        }
        ElementValue::Annotation(annotation) => {
            out.push(b'@');
            write_annotation(out, pool, annotation)?;
        }
        ElementValue::Array(values) => {
            out.push(b'[');
            put_count(out, values.len(), "array elements")?;
            for value in values {
                write_element_value(out, pool, value)?;
            }
        }
    }
    Ok(())
}

fn put_attributes(out: &mut Vec<u8>, attributes: Vec<(u16, Vec<u8>)>) -> Result<()> {
    put_count(out, attributes.len(), "attributes")?;
    for (name_index, body) in attributes {
        put_u16(out, name_index);
        let len = u32::try_from(body.len()).map_err(|_| ClassFileError::TooMany {
            what: "attribute length",
            count: body.len(),
        })?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&body);
    }
    Ok(())
}

fn put_count(out: &mut Vec<u8>, count: usize, what: &'static str) -> Result<()> {
    let count = u16::try_from(count).map_err(|_| ClassFileError::TooMany { what, count })?;
    put_u16(out, count);
    Ok(())
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}
