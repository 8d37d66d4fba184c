use std::fs::{self, File};
use std::path::Path;

use reclass::archive::ArchiveReader;
use reclass::classfile::{decode_unit, encode_unit};
use reclass::config::AdapterConfig;
use reclass::convert::{convert, write_archive, MODULE_INFO_ENTRY};
use reclass::ir::{
    BlockId, BranchCondition, CallKind, Instruction, MethodRef, Program, Register,
};
use reclass::patch::{PatchOutcome, PatchTarget};
use reclass::source::open_source;
use reclass::unit::{Access, Annotation, CompiledUnit, Field, Method};

const LIB: &str = "org/teavm/classlib/java/";

fn write_unit(root: &Path, unit: &CompiledUnit) {
    let path = root.join(format!("{}.class", unit.name));
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, encode_unit(unit).expect("encode")).expect("write class");
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

fn classlib() -> Vec<CompiledUnit> {
    let mut list = CompiledUnit::new(format!("{LIB}util/TArrayList"));
    list.super_name = Some(format!("{LIB}util/TAbstractList"));
    list.interfaces = vec![format!("{LIB}util/TList")];
    list.signature = Some(format!(
        "<E:Ljava/lang/Object;>L{LIB}util/TAbstractList<TE;>;L{LIB}util/TList<TE;>;"
    ));
    list.fields.push(Field {
        access: Access::PRIVATE,
        name: "elements".to_string(),
        descriptor: "[Ljava/lang/Object;".to_string(),
        signature: None,
        constant: None,
        annotations: Vec::new(),
    });
    list.methods = vec![
        method(
            Access::PUBLIC,
            "iterator",
            &format!("()L{LIB}util/TIterator;"),
        ),
        method(Access::empty(), "grow", "(I)V"),
    ];
    list.annotations.push(Annotation {
        descriptor: "Lorg/teavm/interop/Rename;".to_string(),
        visible: false,
        elements: Vec::new(),
    });

    let mut helper = CompiledUnit::new(format!("{LIB}util/TArrayListHelper"));
    helper.access = Access::FINAL | Access::SUPER;

    let mut system = CompiledUnit::new(format!("{LIB}lang/TSystem"));
    system.methods = vec![
        method(
            Access::PUBLIC | Access::STATIC,
            "out",
            &format!("()L{LIB}io/TPrintStream;"),
        ),
        method(Access::PUBLIC | Access::STATIC, "exit", "(I)V"),
    ];

    let mut throwable = CompiledUnit::new(format!("{LIB}lang/TThrowable"));
    throwable.super_name = Some(format!("{LIB}lang/TObject"));

    let mut object = CompiledUnit::new(format!("{LIB}lang/TObject"));
    object.super_name = Some("java/lang/Object".to_string());

    let internal = CompiledUnit::new("org/teavm/classlib/impl/Base64");

    vec![list, helper, system, throwable, object, internal]
}

#[test]
fn directory_of_classes_converts_into_an_archive() {
    let input = tempfile::tempdir().expect("input dir");
    for unit in classlib() {
        write_unit(input.path(), &unit);
    }
    let output_dir = tempfile::tempdir().expect("output dir");
    let output_path = output_dir.path().join("classlib.bin");

    let mut config = AdapterConfig::default();
    config.module.emit = true;
    let mut source = open_source(input.path()).expect("source");
    let output = convert(source.as_mut(), &config).expect("convert");
    assert!(!output.has_failures());

    let written = write_archive(&output, File::create(&output_path).expect("create")).expect("write");
    let entries = ArchiveReader::new(File::open(&output_path).expect("open"))
        .entries()
        .expect("entries");
    assert_eq!(written, entries.len());

    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "java/lang/Object.class",
            "java/lang/System.class",
            "java/lang/Throwable.class",
            "java/util/ArrayList.class",
            MODULE_INFO_ENTRY,
        ]
    );

    let units: Vec<CompiledUnit> = entries[..4]
        .iter()
        .map(|(_, bytes)| decode_unit(bytes).expect("decode"))
        .collect();

    let object = &units[0];
    assert_eq!(object.super_name, None);

    let system = &units[1];
    assert_eq!(system.fields.len(), 1);
    assert_eq!(system.fields[0].name, "out");
    assert_eq!(system.fields[0].descriptor, "Ljava/io/PrintStream;");
    assert_eq!(system.methods.len(), 1);
    assert_eq!(system.methods[0].name, "exit");

    let throwable = &units[2];
    assert_eq!(throwable.super_name.as_deref(), Some("java/lang/Object"));

    let list = &units[3];
    assert_eq!(list.super_name.as_deref(), Some("java/util/AbstractList"));
    assert_eq!(list.interfaces, vec!["java/util/List".to_string()]);
    assert_eq!(
        list.signature.as_deref(),
        Some("<E:Ljava/lang/Object;>Ljava/util/AbstractList<TE;>;Ljava/util/List<TE;>;")
    );
    assert!(list.fields.is_empty());
    assert_eq!(list.methods.len(), 1);
    assert_eq!(list.methods[0].descriptor, "()Ljava/util/Iterator;");
    assert!(list.annotations.is_empty());

    let report = output.report();
    assert_eq!(report.units, 6);
    assert_eq!(report.emitted.len(), 4);
    assert_eq!(report.suppressed.len(), 2);
    let module = report.module.expect("module entry");
    assert_eq!(module.packages, vec!["java/lang".to_string(), "java/util".to_string()]);
}

#[test]
fn package_private_unit_is_absent_from_output() {
    let input = tempfile::tempdir().expect("input dir");
    let mut hidden = CompiledUnit::new(format!("{LIB}util/TSpliterators"));
    hidden.access = Access::SUPER;
    write_unit(input.path(), &hidden);

    let mut source = open_source(input.path()).expect("source");
    let output = convert(source.as_mut(), &AdapterConfig::default()).expect("convert");
    assert!(output.emitted().is_empty());
    let report = serde_json::to_value(output.report()).expect("report");
    assert_eq!(report["suppressed"][0]["reason"], "not public or protected");
    assert!(report.get("module").is_none());
}

#[test]
fn system_exit_is_stubbed_with_a_throw() {
    let patcher = AdapterConfig::default().patcher().expect("patcher");
    let target = PatchTarget {
        class: "java/lang/System",
        method: "exit",
        descriptor: "(I)V",
        is_static: true,
    };
    let mut program = Program::new(1);
    program.create_block();
    program.blocks[0].instructions = vec![
        Instruction::Invoke {
            receiver: None,
            kind: CallKind::Static,
            method: MethodRef::new("java/lang/Runtime", "halt", "(I)V"),
            instance: None,
            arguments: vec![Register(0)],
        },
        Instruction::Exit { value: None },
    ];

    assert_eq!(
        patcher.transform(&target, &mut program).expect("patch"),
        PatchOutcome::Patched
    );
    assert_eq!(program.blocks.len(), 1);
    assert!(matches!(
        program.blocks[0].terminator(),
        Some(Instruction::Raise { .. })
    ));
    assert!(
        program.blocks[0]
            .instructions
            .iter()
            .all(|instruction| !matches!(instruction, Instruction::Exit { .. }))
    );
}

#[test]
fn delete_call_removes_calls_from_every_block() {
    let patcher = AdapterConfig::default().patcher().expect("patcher");
    let target = PatchTarget {
        class: "com/sun/tools/javac/main/JavaCompiler",
        method: "<init>",
        descriptor: "(Lcom/sun/tools/javac/util/Context;)V",
        is_static: false,
    };
    let pre_register = || Instruction::Invoke {
        receiver: None,
        kind: CallKind::Static,
        method: MethodRef::new(
            "com/sun/tools/javac/file/JavacFileManager",
            "preRegister",
            "(Lcom/sun/tools/javac/util/Context;)V",
        ),
        instance: None,
        arguments: vec![Register(1)],
    };

    let mut program = Program::new(2);
    let entry = program.create_block();
    let then = program.create_block();
    let join = program.create_block();
    program.blocks[entry.index()].instructions = vec![
        pre_register(),
        Instruction::Branch {
            condition: BranchCondition::Null,
            operand: Register(1),
            consequent: then,
            alternative: join,
        },
    ];
    program.blocks[then.index()].instructions = vec![
        pre_register(),
        Instruction::Jump { target: join },
    ];
    program.blocks[join.index()].instructions = vec![Instruction::Exit { value: None }];

    assert_eq!(
        patcher.transform(&target, &mut program).expect("patch"),
        PatchOutcome::Patched
    );
    assert_eq!(program.blocks.len(), 3);
    assert!(!program.to_string().contains("preRegister"));
    assert!(matches!(
        program.blocks[0].terminator(),
        Some(Instruction::Branch { .. })
    ));
    assert_eq!(
        program.blocks[1].terminator(),
        Some(&Instruction::Jump { target: BlockId(2) })
    );
    program.validate().expect("valid program");
}
