//! Dispatch compiler: accumulates handler registrations, rejects ambiguous
//! ones at registration time, and linearizes the survivors into one
//! conflict-free decision tree per target program, plus the contract
//! interface descriptor.

use std::collections::BTreeMap;

use crate::abi::{AbiValue, CodecGen, OffsetReadMode};
use crate::ast::{CondArm, Expr, StackTy, TxnArrayField, TxnField};
use crate::contract::{ContractDoc, MethodDoc};
use crate::emit::{assemble, Program};
use crate::error::Error;
use crate::method::{MethodDescriptor, METHOD_ARG_LIMIT};
use crate::version::VmVersion;

/// Completion action requested by an incoming call: the caller's intended
/// post-execution effect. Tag values match the transaction field encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompletionAction {
    NoOp,
    OptIn,
    CloseOut,
    ClearState,
    Update,
    Delete,
}

impl CompletionAction {
    pub fn tag(self) -> u64 {
        match self {
            CompletionAction::NoOp => 0,
            CompletionAction::OptIn => 1,
            CompletionAction::CloseOut => 2,
            CompletionAction::ClearState => 3,
            CompletionAction::Update => 4,
            CompletionAction::Delete => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompletionAction::NoOp => "NoOp",
            CompletionAction::OptIn => "OptIn",
            CompletionAction::CloseOut => "CloseOut",
            CompletionAction::ClearState => "ClearState",
            CompletionAction::Update => "Update",
            CompletionAction::Delete => "Delete",
        }
    }
}

/// A bare-call handler: runs on invocations that carry no call-data
/// arguments. Must produce nothing on the stack.
#[derive(Debug, Clone)]
pub enum BareHandler {
    Expr(Expr),
    /// A named zero-argument body. The name participates in conflict
    /// reporting and dispatch ordering only.
    Subroutine {
        name: String,
        arg_count: usize,
        body: Expr,
    },
}

impl BareHandler {
    fn label(&self) -> String {
        match self {
            BareHandler::Expr(_) => "<expr>".to_string(),
            BareHandler::Subroutine { name, .. } => name.clone(),
        }
    }

    fn takes_zero_args(&self) -> bool {
        match self {
            BareHandler::Expr(_) => true,
            BareHandler::Subroutine { arg_count, .. } => *arg_count == 0,
        }
    }

    fn returns_void(&self) -> bool {
        self.body().type_of() == StackTy::Void
    }

    fn body(&self) -> &Expr {
        match self {
            BareHandler::Expr(e) => e,
            BareHandler::Subroutine { body, .. } => body,
        }
    }
}

/// Result of a method handler's body builder: the effect to run after
/// argument decoding, and the return value producer for non-void methods.
#[derive(Debug, Clone)]
pub struct MethodBody {
    pub effect: Expr,
    pub output: Option<AbiValue>,
}

/// One admitted claim under a completion action.
#[derive(Debug, Clone)]
struct Claim {
    is_method: bool,
    label: String,
    creation: bool,
}

/// Rejects ambiguous registrations before program assembly. Two bare claims
/// under the same completion action and creation flag are ambiguous; method
/// claims are always disambiguated by selector at run time.
#[derive(Debug, Default)]
struct ConflictResolver {
    claims: BTreeMap<CompletionAction, Vec<Claim>>,
}

impl ConflictResolver {
    /// Admit the claim under every listed action, or reject without
    /// committing anything.
    fn admit(&mut self, actions: &[CompletionAction], claim: &Claim) -> Result<(), Error> {
        for action in actions {
            if let Some(existing) = self.claims.get(action).and_then(|claims| {
                claims.iter().find(|c| {
                    !c.is_method && !claim.is_method && c.creation == claim.creation
                })
            }) {
                return Err(Error::registration(format!(
                    "bare handler {:?} conflicts with bare handler {:?} under {} (creation={})",
                    claim.label,
                    existing.label,
                    action.name(),
                    claim.creation
                )));
            }
        }
        for action in actions {
            self.claims.entry(*action).or_default().push(claim.clone());
        }
        Ok(())
    }
}

/// Deterministic dispatch ordering: creation branches first, then method
/// branches before bare branches, then registration order. Preconditions are
/// mutually exclusive by construction; this only stabilizes output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    non_creation: bool,
    bare: bool,
    seq: usize,
}

#[derive(Debug, Clone)]
struct ProgramNode {
    condition: Expr,
    branch: Expr,
    label: String,
    method: Option<MethodDescriptor>,
    order: OrderKey,
}

/// Output of a router build: the two assembled programs and the interface
/// descriptor.
#[derive(Debug, Clone)]
pub struct RouterArtifact {
    pub approval: Program,
    pub clear_state: Program,
    pub contract: ContractDoc,
}

/// Accumulates handler registrations and compiles them into an approval
/// program, a clear-state program, and a contract interface descriptor.
///
/// Registration is fail-fast: conflicts, malformed signatures, and shape
/// errors surface from the registration call, never from the build. The
/// build itself is read-only and repeatable.
#[derive(Debug)]
pub struct Router {
    name: String,
    mode: OffsetReadMode,
    approval: Vec<ProgramNode>,
    clear_state: Vec<ProgramNode>,
    resolver: ConflictResolver,
    seq: usize,
}

impl Router {
    pub fn new(name: impl Into<String>) -> Router {
        Router::with_offset_mode(name, OffsetReadMode::Extract)
    }

    pub fn with_offset_mode(name: impl Into<String>, mode: OffsetReadMode) -> Router {
        Router {
            name: name.into(),
            mode,
            approval: Vec::new(),
            clear_state: Vec::new(),
            resolver: ConflictResolver::default(),
            seq: 0,
        }
    }

    /// Register a handler for invocations carrying no call-data arguments.
    pub fn add_bare_call(
        &mut self,
        handler: BareHandler,
        on_completes: &[CompletionAction],
        creation: bool,
    ) -> Result<(), Error> {
        let label = handler.label();
        if !handler.takes_zero_args() {
            return Err(Error::registration(format!(
                "bare handler {label:?} must take no arguments"
            )));
        }
        if !handler.returns_void() {
            return Err(Error::registration(format!(
                "bare handler {label:?} must produce nothing on the stack"
            )));
        }

        let (approval_conds, clear_conds) = parse_conditions(None, on_completes, creation)?;

        let body = handler.body().clone();
        let branch = if body.has_return() {
            body
        } else {
            Expr::seq(vec![body, Expr::Approve])
        };

        let claim = Claim {
            is_method: false,
            label: label.clone(),
            creation,
        };
        self.resolver.admit(on_completes, &claim)?;
        self.append_node(approval_conds, clear_conds, branch, label, None, creation);
        Ok(())
    }

    /// Register a typed method handler. `build` receives one byte producer
    /// per declared argument, in declaration order, with the 15-argument
    /// grouping already undone.
    pub fn add_method_handler<F>(
        &mut self,
        signature: &str,
        on_complete: CompletionAction,
        creation: bool,
        build: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(&mut CodecGen, &[AbiValue]) -> Result<MethodBody, Error>,
    {
        let descriptor = MethodDescriptor::from_signature(signature)?;
        let on_completes = [on_complete];
        let (approval_conds, clear_conds) =
            parse_conditions(Some(&descriptor), &on_completes, creation)?;

        let mut gen = CodecGen::new(self.mode, descriptor.name());
        let branch = wrap_method(&descriptor, &mut gen, build)?;

        let claim = Claim {
            is_method: true,
            label: descriptor.signature(),
            creation,
        };
        self.resolver.admit(&on_completes, &claim)?;
        let label = descriptor.signature();
        self.append_node(
            approval_conds,
            clear_conds,
            branch,
            label,
            Some(descriptor),
            creation,
        );
        Ok(())
    }

    fn append_node(
        &mut self,
        approval_conds: Vec<Expr>,
        clear_conds: Vec<Expr>,
        branch: Expr,
        label: String,
        method: Option<MethodDescriptor>,
        creation: bool,
    ) {
        let order = OrderKey {
            non_creation: !creation,
            bare: method.is_none(),
            seq: self.seq,
        };
        self.seq += 1;
        if !approval_conds.is_empty() {
            self.approval.push(ProgramNode {
                condition: Expr::and(approval_conds),
                branch: branch.clone(),
                label: label.clone(),
                method: method.clone(),
                order,
            });
        }
        if !clear_conds.is_empty() {
            self.clear_state.push(ProgramNode {
                condition: Expr::and(clear_conds),
                branch,
                label,
                method,
                order,
            });
        }
    }

    /// Compile the accumulated registrations for the given target version.
    /// Repeatable: identical state yields structurally identical artifacts.
    pub fn build_program(&self, version: VmVersion) -> Result<RouterArtifact, Error> {
        let approval_nodes = sorted_nodes(&self.approval, "approval")?;
        let clear_nodes = sorted_nodes(&self.clear_state, "clear-state")?;

        for node in approval_nodes.iter().chain(&clear_nodes) {
            let need = node.condition.min_version().max(node.branch.min_version());
            if need > version {
                return Err(Error::version(format!(
                    "handler {:?} requires VM {need}, target is {version}",
                    node.label
                )));
            }
        }

        let approval = assemble(&dispatch_tree(&approval_nodes), version)?;
        let clear_state = assemble(&dispatch_tree(&clear_nodes), version)?;

        let methods: Vec<MethodDoc> = approval_nodes
            .iter()
            .filter_map(|n| n.method.as_ref())
            .map(MethodDoc::from)
            .collect();
        let contract = ContractDoc::new(self.name.clone(), methods);

        Ok(RouterArtifact {
            approval,
            clear_state,
            contract,
        })
    }
}

fn sorted_nodes<'a>(nodes: &'a [ProgramNode], program: &str) -> Result<Vec<&'a ProgramNode>, Error> {
    if nodes.is_empty() {
        return Err(Error::build(format!(
            "{program} program has no registered branches"
        )));
    }
    let mut out: Vec<&ProgramNode> = nodes.iter().collect();
    out.sort_by_key(|n| n.order);
    Ok(out)
}

fn dispatch_tree(nodes: &[&ProgramNode]) -> Expr {
    Expr::Cond(
        nodes
            .iter()
            .map(|n| CondArm {
                test: n.condition.clone(),
                body: n.branch.clone(),
            })
            .collect(),
    )
}

/// Admission precondition per registration kind, split into the approval
/// program's conjuncts and the clear-state program's conjuncts.
fn parse_conditions(
    descriptor: Option<&MethodDescriptor>,
    on_completes: &[CompletionAction],
    creation: bool,
) -> Result<(Vec<Expr>, Vec<Expr>), Error> {
    if on_completes.is_empty() {
        return Err(Error::registration(
            "completion-action set must be non-empty",
        ));
    }
    for (i, oc) in on_completes.iter().enumerate() {
        if on_completes[..i].contains(oc) {
            return Err(Error::registration(format!(
                "duplicate completion action {} in one registration",
                oc.name()
            )));
        }
    }

    let clear_state = on_completes.contains(&CompletionAction::ClearState);
    let close_out = on_completes.contains(&CompletionAction::CloseOut);
    if creation && (clear_state || close_out) {
        return Err(Error::registration(
            "creation is mutually exclusive with ClearState/CloseOut",
        ));
    }

    let method_or_bare = match descriptor {
        Some(d) => {
            if d.grouped_arg_types().len() > METHOD_ARG_LIMIT {
                return Err(Error::internal(format!(
                    "method {:?} cannot be packed into {METHOD_ARG_LIMIT} call-data arguments",
                    d.signature()
                )));
            }
            Expr::and(vec![
                Expr::eq(
                    Expr::Txna(TxnArrayField::AppArgs, 0),
                    Expr::Bytes(d.selector().to_vec()),
                ),
                Expr::eq(
                    Expr::Txn(TxnField::NumAppArgs),
                    Expr::int(d.call_data_args() as u64),
                ),
            ])
        }
        None => Expr::eq(Expr::Txn(TxnField::NumAppArgs), Expr::int(0)),
    };

    let mut approval_conds: Vec<Expr> = Vec::new();
    if creation {
        approval_conds.push(Expr::eq(Expr::Txn(TxnField::AppId), Expr::int(0)));
    }

    let approval_actions: Vec<&CompletionAction> = on_completes
        .iter()
        .filter(|oc| **oc != CompletionAction::ClearState)
        .collect();
    if !approval_actions.is_empty() {
        approval_conds.push(method_or_bare.clone());
        approval_conds.push(Expr::or(
            approval_actions
                .iter()
                .map(|oc| {
                    Expr::eq(Expr::Txn(TxnField::OnCompletion), Expr::int(oc.tag()))
                })
                .collect(),
        ));
    }

    let clear_conds: Vec<Expr> = if clear_state {
        vec![method_or_bare]
    } else {
        Vec::new()
    };

    Ok((approval_conds, clear_conds))
}

/// Decode call data per the descriptor's grouped layout, hand the original
/// argument producers to the body builder, and close the branch with the
/// return-event log (non-void methods) and the accept terminator.
fn wrap_method<F>(
    descriptor: &MethodDescriptor,
    gen: &mut CodecGen,
    build: F,
) -> Result<Expr, Error>
where
    F: FnOnce(&mut CodecGen, &[AbiValue]) -> Result<MethodBody, Error>,
{
    let grouped = descriptor.grouped_arg_types();
    let original = descriptor.arg_types();

    let mut stores: Vec<Expr> = Vec::new();
    let mut slots: Vec<String> = Vec::new();
    for (i, _) in grouped.iter().enumerate() {
        let slot = format!("{}.arg{i}", descriptor.name());
        stores.push(Expr::store(
            slot.clone(),
            Expr::Txna(TxnArrayField::AppArgs, (i + 1) as u8),
        ));
        slots.push(slot);
    }

    let mut args: Vec<AbiValue> = Vec::new();
    if original.len() == grouped.len() {
        for (i, spec) in original.iter().enumerate() {
            args.push(AbiValue::computed(
                spec.clone(),
                Expr::load(slots[i].clone(), StackTy::Bytes),
            ));
        }
    } else {
        // Arguments past the grouping boundary travel inside the trailing
        // synthetic tuple and are extracted member by member.
        let boundary = METHOD_ARG_LIMIT - 1;
        for (i, spec) in original[..boundary].iter().enumerate() {
            args.push(AbiValue::computed(
                spec.clone(),
                Expr::load(slots[i].clone(), StackTy::Bytes),
            ));
        }
        let tuple_spec = &grouped[boundary];
        let tuple_region = Expr::load(slots[boundary].clone(), StackTy::Bytes);
        for (j, spec) in original[boundary..].iter().enumerate() {
            let member = gen.field(tuple_spec, &[j], tuple_region.clone())?;
            args.push(AbiValue::computed(spec.clone(), member));
        }
    }

    let body = build(gen, &args)?;
    if body.effect.type_of() != StackTy::Void {
        return Err(Error::registration(format!(
            "method {:?}: body effect must produce nothing on the stack",
            descriptor.signature()
        )));
    }

    let mut branch = stores;
    branch.push(body.effect);
    match (descriptor.return_type(), body.output) {
        (Some(ret), Some(output)) => {
            if output.spec() != ret {
                return Err(Error::registration(format!(
                    "method {:?}: body returns {}, signature declares {}",
                    descriptor.signature(),
                    output.spec().canonical(),
                    ret.canonical()
                )));
            }
            let payload = gen.encode(&output)?;
            branch.push(Expr::Log(Box::new(Expr::concat(vec![
                Expr::Bytes(slate_contracts::RETURN_EVENT_MARKER.to_vec()),
                payload,
            ]))));
        }
        (Some(_), None) => {
            return Err(Error::registration(format!(
                "method {:?} declares a return type but its body produces no output",
                descriptor.signature()
            )))
        }
        (None, Some(_)) => {
            return Err(Error::registration(format!(
                "void method {:?} must not produce an output",
                descriptor.signature()
            )))
        }
        (None, None) => {}
    }
    branch.push(Expr::Approve);
    Ok(Expr::seq(branch))
}
