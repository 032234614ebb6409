use slatec::ast::{Expr, StackTy};
use slatec::router::{BareHandler, CompletionAction, MethodBody, Router};
use slatec::{ErrorKind, TypeSpec, VmVersion};

fn register_add(router: &mut Router) {
    router
        .add_method_handler(
            "add(uint64,uint64)uint64",
            CompletionAction::NoOp,
            false,
            |gen, args| {
                let sum = Expr::add(gen.uint_value(&args[0])?, gen.uint_value(&args[1])?);
                Ok(MethodBody {
                    effect: Expr::seq(vec![Expr::store("add.sum", sum)]),
                    output: Some(gen.value_from_uint(
                        &TypeSpec::Uint { bits: 64 },
                        Expr::load("add.sum", StackTy::Uint),
                    )?),
                })
            },
        )
        .expect("register add");
}

fn register_create(router: &mut Router) {
    router
        .add_bare_call(
            BareHandler::Subroutine {
                name: "create".to_string(),
                arg_count: 0,
                body: Expr::Approve,
            },
            &[CompletionAction::NoOp],
            true,
        )
        .expect("register create");
}

fn register_clear(router: &mut Router) {
    router
        .add_bare_call(
            BareHandler::Expr(Expr::Approve),
            &[CompletionAction::ClearState],
            false,
        )
        .expect("register clear");
}

#[test]
fn build_fails_without_clear_state_branches() {
    let mut router = Router::new("calculator");
    register_add(&mut router);
    register_create(&mut router);
    let err = router.build_program(VmVersion::DEFAULT).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Build);
}

#[test]
fn end_to_end_build_orders_creation_before_method() {
    let mut router = Router::new("calculator");
    register_add(&mut router);
    register_create(&mut router);
    register_clear(&mut router);

    let artifact = router.build_program(VmVersion::DEFAULT).expect("build");
    let lines = &artifact.approval.lines;

    // Two branches: the creation bare call's test reads ApplicationId, the
    // method's test matches the selector in call-data slot 0. Creation sorts
    // first.
    let creation_test = lines
        .iter()
        .position(|l| l == "txn ApplicationId")
        .expect("creation test present");
    let selector_test = lines
        .iter()
        .position(|l| l == "txna ApplicationArgs 0")
        .expect("selector test present");
    assert!(
        creation_test < selector_test,
        "creation branch must be tested first:\n{}",
        artifact.approval.source()
    );

    // Bare precondition pins zero call-data arguments; the method's pins
    // 1 + argc. Mutual exclusivity does not depend on branch order.
    assert!(lines.contains(&"int 0".to_string()));
    assert!(lines.contains(&"int 3".to_string()));

    // Non-void method return: marker-prefixed log in the method branch.
    assert!(
        lines.iter().any(|l| l.starts_with("byte 0x151f7c75")),
        "return-event marker missing:\n{}",
        artifact.approval.source()
    );
    assert!(lines.contains(&"log".to_string()));

    // Clear-state program holds exactly the one bare branch.
    let clear = &artifact.clear_state.lines;
    assert!(clear.contains(&"txn NumAppArgs".to_string()));
    assert!(!clear.iter().any(|l| l.starts_with("txna")));
}

#[test]
fn interface_descriptor_lists_approval_methods() {
    let mut router = Router::new("calculator");
    register_add(&mut router);
    register_create(&mut router);
    register_clear(&mut router);

    let artifact = router.build_program(VmVersion::DEFAULT).expect("build");
    let doc = artifact.contract.to_json_value();
    assert_eq!(doc["name"], "calculator");
    assert_eq!(doc["methods"].as_array().expect("methods").len(), 1);
    assert_eq!(doc["methods"][0]["name"], "add");
    assert_eq!(doc["methods"][0]["args"].as_array().expect("args").len(), 2);
    assert_eq!(doc["methods"][0]["returns"]["type"], "uint64");
}

#[test]
fn build_is_repeatable() {
    let mut router = Router::new("calculator");
    register_add(&mut router);
    register_create(&mut router);
    register_clear(&mut router);

    let a = router.build_program(VmVersion::DEFAULT).expect("first build");
    let b = router.build_program(VmVersion::DEFAULT).expect("second build");
    assert_eq!(a.approval.lines, b.approval.lines);
    assert_eq!(a.approval.fingerprint, b.approval.fingerprint);
    assert_eq!(a.clear_state.lines, b.clear_state.lines);
    assert_eq!(a.contract, b.contract);
}

#[test]
fn seventeen_argument_method_builds_with_grouped_decode() {
    let mut router = Router::new("wide");
    let args: Vec<String> = (0..17).map(|_| "uint64".to_string()).collect();
    let signature = format!("many({})void", args.join(","));
    router
        .add_method_handler(&signature, CompletionAction::NoOp, false, |gen, args| {
            assert_eq!(args.len(), 17, "builder sees the original arity");
            // Touch the last argument so the synthetic-tuple extraction is
            // part of the branch.
            let last = gen.uint_value(&args[16])?;
            Ok(MethodBody {
                effect: Expr::seq(vec![Expr::store("many.last", last)]),
                output: None,
            })
        })
        .expect("register many");
    register_clear(&mut router);

    let artifact = router.build_program(VmVersion::DEFAULT).expect("build");
    let lines = &artifact.approval.lines;
    // Call-data argument count is 1 + 15, not 1 + 17.
    assert!(lines.contains(&"int 16".to_string()));
    assert!(lines.contains(&"txna ApplicationArgs 15".to_string()));
    assert!(!lines.iter().any(|l| l.starts_with("txna ApplicationArgs 16")));
}
