use proptest::prelude::*;

use reclass::config::AdapterConfig;
use reclass::descriptor::rewrite_descriptor;
use reclass::ir::{BlockId, CallKind, Constant, Instruction, MethodRef, Program, Register};
use reclass::patch::{
    PatchEntry, PatchOutcome, PatchTable, PatchTarget, Patcher, ReplacementAction, ReturnValue,
};
use reclass::rename::{Identity, NameMapper, Renamer};
use reclass::signature::{rewrite_class_signature, rewrite_field_signature};

fn identifier() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9_]{0,6}"
}

fn qualified_name() -> impl Strategy<Value = String> {
    (prop::collection::vec(identifier(), 0..4), "[A-Z][a-zA-Z0-9]{0,6}").prop_map(
        |(packages, simple)| {
            let mut name = packages.join("/");
            if !name.is_empty() {
                name.push('/');
            }
            name.push_str(&simple);
            name
        },
    )
}

fn descriptor() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        "[ZBCSIJFD]",
        qualified_name().prop_map(|name| format!("L{name};")),
    ];
    leaf.prop_recursive(4, 8, 1, |inner| inner.prop_map(|element| format!("[{element}")))
}

/// Reference type signatures with nested type arguments, wildcards and
/// inner-class continuations.
fn reference_signature() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        qualified_name().prop_map(|name| format!("L{name};")),
        "[A-Z]".prop_map(|variable| format!("T{variable};")),
    ];
    leaf.prop_recursive(3, 16, 3, |inner| {
        (
            qualified_name(),
            prop::collection::vec(
                (prop_oneof![Just(""), Just("+"), Just("-")], inner.clone()),
                1..3,
            ),
            prop::option::of("[A-Z][a-z]{0,4}"),
            any::<bool>(),
        )
            .prop_map(|(erasure, arguments, inner_name, wildcard)| {
                let mut signature = format!("L{erasure}<");
                if wildcard {
                    signature.push('*');
                }
                for (bound, argument) in arguments {
                    signature.push_str(bound);
                    signature.push_str(&argument);
                }
                signature.push('>');
                if let Some(inner_name) = inner_name {
                    signature.push('.');
                    signature.push_str(&inner_name);
                }
                signature.push(';');
                signature
            })
    })
}

fn relocate(name: &str) -> String {
    format!("moved/{name}")
}

fn default_renamer() -> Renamer {
    AdapterConfig::default().renamer().expect("renamer")
}

proptest! {
    #[test]
    fn rename_is_idempotent(name in qualified_name(), marked in any::<bool>()) {
        let renamer = default_renamer();
        let name = if marked {
            format!("org/teavm/classlib/java/{name}")
        } else {
            name
        };
        let once = renamer.map_name(&name).into_owned();
        let twice = renamer.map_name(&once).into_owned();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn identity_rewrite_preserves_descriptors(desc in descriptor()) {
        prop_assert_eq!(rewrite_descriptor(&desc, &Identity).expect("rewrite"), desc);
    }

    #[test]
    fn rewritten_signatures_stay_balanced(signature in reference_signature()) {
        let identity = rewrite_field_signature(&signature, &Identity).expect("identity");
        prop_assert_eq!(&identity, &signature);

        let rewritten = rewrite_field_signature(&signature, &relocate).expect("rewrite");
        let opened = rewritten.matches('<').count();
        let closed = rewritten.matches('>').count();
        prop_assert_eq!(opened, closed);
        prop_assert_eq!(opened, signature.matches('<').count());

        let class_signature = format!("<T:Ljava/lang/Object;>Ljava/lang/Object;{signature}");
        if signature.starts_with('L') {
            let rewritten = rewrite_class_signature(&class_signature, &relocate).expect("class");
            prop_assert_eq!(rewritten.matches('<').count(), rewritten.matches('>').count());
            prop_assert!(rewritten.starts_with("<T:Lmoved/java/lang/Object;>"));
        }
    }

    #[test]
    fn stub_patch_is_idempotent(value in any::<i32>(), extra in 0u32..4) {
        let mut table = PatchTable::new();
        table.insert(PatchEntry::new(
            "a/B",
            "size",
            "()I",
            ReplacementAction::StubReturn {
                value: ReturnValue::Constant(Constant::Int(value)),
            },
        ));
        let patcher = Patcher::new(table, Renamer::default());
        let target = PatchTarget { class: "a/B", method: "size", descriptor: "()I", is_static: false };

        let mut program = Program::new(1);
        program.create_block();
        let registers: Vec<Register> = (0..=extra).map(|_| program.create_register()).collect();
        program.blocks[0].instructions = vec![
            Instruction::Const { receiver: registers[0], value: Constant::String("original".to_string()) },
            Instruction::Exit { value: Some(registers[0]) },
        ];

        prop_assert_eq!(patcher.transform(&target, &mut program).expect("patch"), PatchOutcome::Patched);
        let patched = program.clone();
        prop_assert_eq!(patcher.transform(&target, &mut program).expect("patch"), PatchOutcome::Unchanged);
        prop_assert_eq!(program, patched);
    }

    #[test]
    fn delete_call_is_idempotent(calls in prop::collection::vec(any::<bool>(), 1..6)) {
        let mut table = PatchTable::new();
        table.insert(PatchEntry::new(
            "a/B",
            "run",
            "()V",
            ReplacementAction::DeleteCall { class: "x/Y".to_string(), method: "log".to_string() },
        ));
        let patcher = Patcher::new(table, Renamer::default());
        let target = PatchTarget { class: "a/B", method: "run", descriptor: "()V", is_static: false };

        let mut program = Program::new(1);
        let count = calls.len() as u32;
        for (index, targeted) in calls.iter().enumerate() {
            let id = program.create_block();
            let class = if *targeted { "x/Y" } else { "x/Z" };
            let terminator = if (index as u32) + 1 < count {
                Instruction::Jump { target: BlockId(id.0 + 1) }
            } else {
                Instruction::Exit { value: None }
            };
            program.blocks[id.index()].instructions = vec![
                Instruction::Invoke {
                    receiver: None,
                    kind: CallKind::Static,
                    method: MethodRef::new(class, "log", "()V"),
                    instance: None,
                    arguments: Vec::new(),
                },
                terminator,
            ];
        }

        patcher.transform(&target, &mut program).expect("patch");
        let patched = program.clone();
        prop_assert!(!patched.to_string().contains("x/Y.log"));
        prop_assert_eq!(patcher.transform(&target, &mut program).expect("patch"), PatchOutcome::Unchanged);
        prop_assert_eq!(program, patched);
    }
}
