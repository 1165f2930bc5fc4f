//! Tree-walking interpreter for validated programs.
//!
//! Runs entirely on one worker thread against a merged namespace (shared
//! safe builtins + the user's thawed variables). Every evaluation step
//! consumes fuel; every 1024 steps the interpreter polls the cancellation
//! flag and the wall-clock deadline, so a tight loop is interrupted even
//! though the caller cannot kill the thread outright. Loop iteration and
//! call depth carry their own budgets.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::lang::ast::*;
use crate::sandbox::builtins::{safe_builtins, BuiltinId};
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::guard::GuardLimits;
use crate::sandbox::io::CapturedOutput;
use crate::sandbox::methods;
use crate::sandbox::operators::{self, OpError};
use crate::sandbox::value::{
    range_len, values_compare, values_equal, FunctionObject, Value,
};

/// How often (in steps) the cancel flag and deadline are polled.
const INTERRUPT_CHECK_INTERVAL: u64 = 1024;

/// A fault that aborts evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecFault {
    /// An exception in user code (name errors, type errors, budget
    /// exhaustion, ...).
    Runtime(String),
    /// The cancel flag was raised or the deadline passed.
    Deadline,
    /// A size ceiling was hit while the code ran (output buffer,
    /// repetition caps).
    Size(String),
}

/// Non-local control flow during evaluation.
#[derive(Debug)]
pub(crate) enum Flow {
    Break,
    Continue,
    Return(Value),
    Fault(ExecFault),
}

pub(crate) type Exec<T> = Result<T, Flow>;

pub(crate) fn rt(message: impl Into<String>) -> Flow {
    Flow::Fault(ExecFault::Runtime(message.into()))
}

impl From<OpError> for Flow {
    fn from(e: OpError) -> Flow {
        match e {
            OpError::Runtime(msg) => Flow::Fault(ExecFault::Runtime(msg)),
            OpError::Size(msg) => Flow::Fault(ExecFault::Size(msg)),
        }
    }
}

/// The evaluator. One instance per execution, discarded afterward.
pub struct Interpreter {
    pub(crate) globals: HashMap<String, Value>,
    pub(crate) scopes: Vec<HashMap<String, Value>>,
    pub(crate) output: CapturedOutput,
    pub(crate) limits: GuardLimits,
    fuel: u64,
    steps: u64,
    max_loop_iterations: u64,
    max_call_depth: usize,
    call_depth: usize,
    cancel: Arc<AtomicBool>,
    deadline: Instant,
}

impl Interpreter {
    /// Create an interpreter over an already-merged user namespace.
    pub fn new(
        config: &SandboxConfig,
        globals: HashMap<String, Value>,
        cancel: Arc<AtomicBool>,
        deadline: Instant,
    ) -> Self {
        Interpreter {
            globals,
            scopes: Vec::new(),
            output: CapturedOutput::new(config.max_output_bytes),
            limits: GuardLimits::from(config),
            fuel: config.max_fuel,
            steps: 0,
            max_loop_iterations: config.max_loop_iterations,
            max_call_depth: config.max_recursion_depth,
            call_depth: 0,
            cancel,
            deadline,
        }
    }

    /// Run a program. Returns the terminal value for expression programs.
    pub fn run(&mut self, program: &Program) -> Result<Option<Value>, ExecFault> {
        let result = match program.kind {
            ProgramKind::Expression => match &program.body[..] {
                [Stmt::Expr(expr)] => self.eval(expr).map(Some),
                _ => Err(rt("malformed expression program")),
            },
            ProgramKind::Statements => self
                .exec_block(&program.body)
                .map(|()| None),
        };
        match result {
            Ok(value) => Ok(value),
            Err(Flow::Fault(fault)) => Err(fault),
            Err(Flow::Break) | Err(Flow::Continue) => {
                Err(ExecFault::Runtime("'break' outside loop".into()))
            }
            Err(Flow::Return(_)) => Err(ExecFault::Runtime("'return' outside function".into())),
        }
    }

    /// Consume the interpreter, yielding the final globals and output.
    pub fn into_parts(self) -> (HashMap<String, Value>, String) {
        (self.globals, self.output.into_string())
    }

    /// Charge one step of fuel and periodically poll for interruption.
    pub(crate) fn tick(&mut self) -> Exec<()> {
        if self.fuel == 0 {
            return Err(rt("evaluation budget exceeded"));
        }
        self.fuel -= 1;
        self.steps += 1;
        if self.steps % INTERRUPT_CHECK_INTERVAL == 0
            && (self.cancel.load(Ordering::Relaxed) || Instant::now() >= self.deadline)
        {
            return Err(Flow::Fault(ExecFault::Deadline));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn exec_block(&mut self, body: &[Stmt]) -> Exec<()> {
        for stmt in body {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> Exec<()> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(())
            }
            Stmt::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
                Ok(())
            }
            Stmt::AugAssign { target, op, value } => {
                let rhs = self.eval(value)?;
                match target {
                    Target::Name(name) => {
                        let current = self.lookup(name)?;
                        let updated = operators::binary(*op, &current, &rhs, &self.limits)?;
                        self.bind(name, updated);
                        Ok(())
                    }
                    Target::Subscript { value, index } => {
                        let object = self.eval(value)?;
                        let index = self.eval(index)?;
                        let current = operators::index_value(&object, &index)?;
                        let updated = operators::binary(*op, &current, &rhs, &self.limits)?;
                        self.store_subscript(&object, index, updated)
                    }
                    Target::Attribute { .. } => Err(rt("cannot assign to attribute")),
                    Target::Tuple(_) => Err(rt("cannot use tuple as augmented target")),
                }
            }
            Stmt::If { test, body, orelse } => {
                if self.eval(test)?.truthy() {
                    self.exec_block(body)
                } else {
                    self.exec_block(orelse)
                }
            }
            Stmt::While { test, body } => {
                let mut iterations: u64 = 0;
                while self.eval(test)?.truthy() {
                    iterations += 1;
                    if iterations > self.max_loop_iterations {
                        return Err(rt("loop iteration limit exceeded"));
                    }
                    match self.exec_block(body) {
                        Ok(()) | Err(Flow::Continue) => {}
                        Err(Flow::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            Stmt::For { target, iter, body } => {
                let iterable = self.eval(iter)?;
                let mut iter = self.for_iter(iterable)?;
                let mut iterations: u64 = 0;
                while let Some(item) = iter.next_item() {
                    self.tick()?;
                    iterations += 1;
                    if iterations > self.max_loop_iterations {
                        return Err(rt("loop iteration limit exceeded"));
                    }
                    self.assign(target, item)?;
                    match self.exec_block(body) {
                        Ok(()) | Err(Flow::Continue) => {}
                        Err(Flow::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            Stmt::FunctionDef(def) => {
                let mut defaults = Vec::new();
                for param in &def.params {
                    if let Some(default) = &param.default {
                        defaults.push(self.eval(default)?);
                    }
                }
                let function = Value::Function(Rc::new(FunctionObject {
                    def: Arc::new(def.clone()),
                    defaults,
                }));
                self.bind(&def.name, function);
                Ok(())
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                Err(Flow::Return(value))
            }
            Stmt::Break => Err(Flow::Break),
            Stmt::Continue => Err(Flow::Continue),
            Stmt::Pass => Ok(()),

            // Unreachable once the validator has run; kept as a hard
            // backstop in case the engine is fed an unvalidated tree.
            Stmt::Delete(_)
            | Stmt::Import { .. }
            | Stmt::ImportFrom { .. }
            | Stmt::Global(_)
            | Stmt::Nonlocal(_)
            | Stmt::ClassDef { .. }
            | Stmt::AsyncFunctionDef(_) => Err(rt("construct is not available in the sandbox")),
        }
    }

    fn assign(&mut self, target: &Target, value: Value) -> Exec<()> {
        match target {
            Target::Name(name) => {
                self.bind(name, value);
                Ok(())
            }
            Target::Tuple(targets) => {
                let items = self.materialize(value)?;
                if items.len() != targets.len() {
                    return Err(rt(format!(
                        "cannot unpack {} values into {} targets",
                        items.len(),
                        targets.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
            Target::Subscript { value: obj, index } => {
                let object = self.eval(obj)?;
                let index = self.eval(index)?;
                self.store_subscript(&object, index, value)
            }
            Target::Attribute { .. } => Err(rt("cannot assign to attribute")),
        }
    }

    fn store_subscript(&mut self, object: &Value, index: Value, value: Value) -> Exec<()> {
        match object {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let len = items.len();
                let idx = match index {
                    Value::Int(i) => i,
                    Value::Bool(b) => b as i64,
                    other => {
                        return Err(rt(format!(
                            "list indices must be integers, not '{}'",
                            other.type_name()
                        )))
                    }
                };
                match operators::normalize_index(idx, len) {
                    Some(i) => {
                        items[i] = value;
                        Ok(())
                    }
                    None => Err(rt("list assignment index out of range")),
                }
            }
            Value::Dict(pairs) => {
                if !index.is_hashable() {
                    return Err(rt(format!("unhashable type: '{}'", index.type_name())));
                }
                let mut pairs = pairs.borrow_mut();
                if let Some(slot) = pairs.iter_mut().find(|(k, _)| values_equal(k, &index)) {
                    slot.1 = value;
                } else {
                    if pairs.len() >= self.limits.max_collection_size {
                        return Err(Flow::Fault(ExecFault::Size(format!(
                            "collection larger than {} elements",
                            self.limits.max_collection_size
                        ))));
                    }
                    pairs.push((index, value));
                }
                Ok(())
            }
            other => Err(rt(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    /// Bind a name in the innermost scope (globals at top level).
    pub(crate) fn bind(&mut self, name: &str, value: Value) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /// Resolve a name: enclosing scopes, then globals, then builtins.
    fn lookup(&self, name: &str) -> Exec<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if let Some(stored) = safe_builtins().get(name) {
            return Ok(stored.thaw());
        }
        Err(rt(format!("name '{name}' is not defined")))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub(crate) fn eval(&mut self, expr: &Expr) -> Exec<Value> {
        self.tick()?;
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(v) => Value::Int(*v),
                Literal::Float(v) => Value::Float(*v),
                Literal::Str(s) => Value::str(s.clone()),
            }),
            Expr::Name(name) => self.lookup(name),
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FStringPart::Literal(text) => out.push_str(text),
                        FStringPart::Expr(e) => {
                            let value = self.eval(e)?;
                            out.push_str(&value.display());
                        }
                    }
                }
                if out.chars().count() > self.limits.max_string_length {
                    return Err(Flow::Fault(ExecFault::Size(format!(
                        "string longer than {} characters",
                        self.limits.max_string_length
                    ))));
                }
                Ok(Value::str(out))
            }
            Expr::Tuple(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Exec<Vec<_>>>()?;
                Ok(Value::tuple(values))
            }
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Exec<Vec<_>>>()?;
                Ok(Value::list(values))
            }
            Expr::Set(items) => {
                let mut values: Vec<Value> = Vec::new();
                for item in items {
                    let value = self.eval(item)?;
                    self.require_hashable(&value)?;
                    if !values.iter().any(|v| values_equal(v, &value)) {
                        values.push(value);
                    }
                }
                Ok(Value::set(values))
            }
            Expr::Dict(entries) => {
                let mut pairs: Vec<(Value, Value)> = Vec::new();
                for (k, v) in entries {
                    let key = self.eval(k)?;
                    self.require_hashable(&key)?;
                    let value = self.eval(v)?;
                    if let Some(slot) = pairs.iter_mut().find(|(k2, _)| values_equal(k2, &key)) {
                        slot.1 = value;
                    } else {
                        pairs.push((key, value));
                    }
                }
                Ok(Value::dict(pairs))
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(operators::unary(*op, &value)?)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(operators::binary(*op, &left, &right, &self.limits)?)
            }
            Expr::BoolOp { op, values } => {
                let mut last = Value::None;
                for (i, expr) in values.iter().enumerate() {
                    last = self.eval(expr)?;
                    let truthy = last.truthy();
                    let short_circuit = match op {
                        BoolOp::And => !truthy,
                        BoolOp::Or => truthy,
                    };
                    if short_circuit && i + 1 < values.len() {
                        return Ok(last);
                    }
                }
                Ok(last)
            }
            Expr::Compare {
                left,
                ops,
                comparators,
            } => {
                let mut current = self.eval(left)?;
                for (op, comparator) in ops.iter().zip(comparators) {
                    let next = self.eval(comparator)?;
                    let outcome = operators::compare(*op, &current, &next)?;
                    if !outcome.truthy() {
                        return Ok(Value::Bool(false));
                    }
                    current = next;
                }
                Ok(Value::Bool(true))
            }
            Expr::Call { func, args, kwargs } => self.eval_call(func, args, kwargs),
            Expr::Attribute { value, attr } => {
                let receiver = self.eval(value)?;
                self.eval_attribute(&receiver, attr)
            }
            Expr::Subscript { value, index } => {
                let object = self.eval(value)?;
                if let Expr::Slice { lower, upper, step } = index.as_ref() {
                    let lower = self.eval_slice_bound(lower)?;
                    let upper = self.eval_slice_bound(upper)?;
                    let step = self.eval_slice_bound(step)?;
                    Ok(operators::slice_value(&object, lower, upper, step)?)
                } else {
                    let index = self.eval(index)?;
                    Ok(operators::index_value(&object, &index)?)
                }
            }
            Expr::Slice { .. } => Err(rt("slice is only valid inside a subscript")),
            Expr::Conditional { body, test, orelse } => {
                if self.eval(test)?.truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Comprehension {
                kind,
                key,
                value,
                generators,
            } => self.eval_comprehension(*kind, key.as_deref(), value, generators),

            Expr::Lambda { .. } | Expr::Await(_) | Expr::Yield(_) | Expr::YieldFrom(_) => {
                Err(rt("construct is not available in the sandbox"))
            }
        }
    }

    fn eval_slice_bound(&mut self, bound: &Option<Box<Expr>>) -> Exec<Option<i64>> {
        match bound {
            None => Ok(None),
            Some(expr) => match self.eval(expr)? {
                Value::Int(v) => Ok(Some(v)),
                Value::Bool(b) => Ok(Some(b as i64)),
                Value::None => Ok(None),
                other => Err(rt(format!(
                    "slice indices must be integers or None, not '{}'",
                    other.type_name()
                ))),
            },
        }
    }

    fn eval_attribute(&mut self, receiver: &Value, attr: &str) -> Exec<Value> {
        match (receiver, attr) {
            (Value::Function(f), "__name__") => Ok(Value::str(f.def.name.clone())),
            (Value::Builtin(id), "__name__") => Ok(Value::str(id.name())),
            (_, "__doc__") => Ok(Value::None),
            (receiver, attr) => {
                if methods::is_method(receiver, attr) {
                    Err(rt(format!(
                        "method '{attr}' of '{}' must be called immediately",
                        receiver.type_name()
                    )))
                } else {
                    Err(rt(format!(
                        "'{}' object has no attribute '{attr}'",
                        receiver.type_name()
                    )))
                }
            }
        }
    }

    fn eval_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Exec<Value> {
        let arg_values = args
            .iter()
            .map(|e| self.eval(e))
            .collect::<Exec<Vec<_>>>()?;
        let kwarg_values = kwargs
            .iter()
            .map(|(name, e)| Ok((name.clone(), self.eval(e)?)))
            .collect::<Exec<Vec<_>>>()?;

        // Method call: receiver.method(...)
        if let Expr::Attribute { value, attr } = func {
            let receiver = self.eval(value)?;
            return methods::call_method(self, receiver, attr, arg_values, kwarg_values);
        }

        let callee = self.eval(func)?;
        self.call_value(callee, arg_values, kwarg_values)
    }

    /// Call any callable value.
    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Exec<Value> {
        match callee {
            Value::Builtin(id) => self.call_builtin(id, args, kwargs),
            Value::Function(f) => self.call_function(&f, args, kwargs),
            other => Err(rt(format!("'{}' object is not callable", other.type_name()))),
        }
    }

    fn call_function(
        &mut self,
        function: &FunctionObject,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Exec<Value> {
        if self.call_depth >= self.max_call_depth {
            return Err(rt("maximum recursion depth exceeded"));
        }
        let def = &function.def;
        let params = &def.params;
        if args.len() > params.len() {
            return Err(rt(format!(
                "{}() takes {} arguments but {} were given",
                def.name,
                params.len(),
                args.len()
            )));
        }

        let mut frame: HashMap<String, Value> = HashMap::with_capacity(params.len());
        for (param, value) in params.iter().zip(args.into_iter()) {
            frame.insert(param.name.clone(), value);
        }
        for (name, value) in kwargs {
            if !params.iter().any(|p| p.name == name) {
                return Err(rt(format!(
                    "{}() got an unexpected keyword argument '{name}'",
                    def.name
                )));
            }
            if frame.contains_key(&name) {
                return Err(rt(format!(
                    "{}() got multiple values for argument '{name}'",
                    def.name
                )));
            }
            frame.insert(name, value);
        }
        // Defaults align with the trailing parameters.
        let first_default = params.len() - function.defaults.len();
        for (i, param) in params.iter().enumerate() {
            if !frame.contains_key(&param.name) {
                if i >= first_default {
                    frame.insert(param.name.clone(), function.defaults[i - first_default].clone());
                } else {
                    return Err(rt(format!(
                        "{}() missing required argument '{}'",
                        def.name, param.name
                    )));
                }
            }
        }

        self.scopes.push(frame);
        self.call_depth += 1;
        let result = self.exec_block(&def.body);
        self.call_depth -= 1;
        self.scopes.pop();

        match result {
            Ok(()) => Ok(Value::None),
            Err(Flow::Return(value)) => Ok(value),
            Err(Flow::Break) | Err(Flow::Continue) => Err(rt("'break' outside loop")),
            Err(fault) => Err(fault),
        }
    }

    fn eval_comprehension(
        &mut self,
        kind: CompKind,
        key: Option<&Expr>,
        value: &Expr,
        generators: &[Comprehension],
    ) -> Exec<Value> {
        // Comprehensions run in their own scope; their targets never leak.
        self.scopes.push(HashMap::new());
        let mut acc = CompAcc::new(kind);
        let result = self.comp_clause(generators, key, value, &mut acc);
        self.scopes.pop();
        result?;
        Ok(acc.finish())
    }

    fn comp_clause(
        &mut self,
        generators: &[Comprehension],
        key: Option<&Expr>,
        value: &Expr,
        acc: &mut CompAcc,
    ) -> Exec<()> {
        let Some((clause, rest)) = generators.split_first() else {
            // Innermost: produce one element.
            match &mut *acc {
                CompAcc::List(items) | CompAcc::Generator(items) => {
                    items.push(self.eval(value)?);
                }
                CompAcc::Set(items) => {
                    let v = self.eval(value)?;
                    self.require_hashable(&v)?;
                    if !items.iter().any(|x| values_equal(x, &v)) {
                        items.push(v);
                    }
                }
                CompAcc::Dict(pairs) => {
                    let k = self.eval(key.expect("dict comprehension has key"))?;
                    self.require_hashable(&k)?;
                    let v = self.eval(value)?;
                    if let Some(slot) = pairs.iter_mut().find(|(k2, _)| values_equal(k2, &k)) {
                        slot.1 = v;
                    } else {
                        pairs.push((k, v));
                    }
                }
            }
            if acc.len() > self.limits.max_collection_size {
                return Err(Flow::Fault(ExecFault::Size(format!(
                    "collection larger than {} elements",
                    self.limits.max_collection_size
                ))));
            }
            return Ok(());
        };

        let iterable = self.eval(&clause.iter)?;
        let mut iter = self.for_iter(iterable)?;
        let mut iterations: u64 = 0;
        'outer: while let Some(item) = iter.next_item() {
            self.tick()?;
            iterations += 1;
            if iterations > self.max_loop_iterations {
                return Err(rt("loop iteration limit exceeded"));
            }
            self.assign(&clause.target, item)?;
            for condition in &clause.conditions {
                if !self.eval(condition)?.truthy() {
                    continue 'outer;
                }
            }
            self.comp_clause(rest, key, value, acc)?;
        }
        Ok(())
    }

    pub(crate) fn require_hashable(&self, value: &Value) -> Exec<()> {
        if value.is_hashable() {
            Ok(())
        } else {
            Err(rt(format!("unhashable type: '{}'", value.type_name())))
        }
    }

    // ------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------

    /// Iterator for `for` loops; ranges stay lazy, other iterables are
    /// snapshotted so body mutation cannot invalidate the iteration.
    pub(crate) fn for_iter(&mut self, value: Value) -> Exec<ValueIter> {
        match value {
            Value::Range { start, stop, step } => Ok(ValueIter::Range {
                current: start,
                stop,
                step,
            }),
            other => Ok(ValueIter::Items(self.materialize(other)?.into_iter())),
        }
    }

    /// Materialize any iterable into a vector, charging fuel per element.
    pub(crate) fn materialize(&mut self, value: Value) -> Exec<Vec<Value>> {
        match value {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok(items.as_ref().clone()),
            Value::Set(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            Value::Dict(pairs) => Ok(pairs.borrow().iter().map(|(k, _)| k.clone()).collect()),
            Value::Range { start, stop, step } => {
                let len = range_len(start, stop, step);
                let mut out = Vec::new();
                let mut current = start;
                for _ in 0..len {
                    self.tick()?;
                    out.push(Value::Int(current));
                    current += step;
                }
                Ok(out)
            }
            other => Err(rt(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Builtins
    // ------------------------------------------------------------------

    fn call_builtin(
        &mut self,
        id: BuiltinId,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Exec<Value> {
        use BuiltinId::*;

        // Only print / sorted / max / min accept keywords.
        if !kwargs.is_empty() && !matches!(id, Print | Sorted | Max | Min) {
            return Err(rt(format!(
                "{}() takes no keyword arguments",
                id.name()
            )));
        }

        match id {
            Abs => {
                let [v] = self.arity::<1>(id, args)?;
                match v {
                    Value::Int(x) => x
                        .checked_abs()
                        .map(Value::Int)
                        .ok_or_else(|| rt("integer overflow")),
                    Value::Float(x) => Ok(Value::Float(x.abs())),
                    Value::Bool(b) => Ok(Value::Int(b as i64)),
                    other => Err(rt(format!(
                        "bad operand type for abs(): '{}'",
                        other.type_name()
                    ))),
                }
            }
            All => {
                let [v] = self.arity::<1>(id, args)?;
                let items = self.materialize(v)?;
                Ok(Value::Bool(items.iter().all(Value::truthy)))
            }
            Any => {
                let [v] = self.arity::<1>(id, args)?;
                let items = self.materialize(v)?;
                Ok(Value::Bool(items.iter().any(Value::truthy)))
            }
            Ascii => {
                let [v] = self.arity::<1>(id, args)?;
                Ok(Value::str(ascii_repr(&v.repr())))
            }
            Bin => self.radix_builtin(id, args, 2, "0b"),
            Oct => self.radix_builtin(id, args, 8, "0o"),
            Hex => self.radix_builtin(id, args, 16, "0x"),
            Bool => {
                if args.is_empty() {
                    return Ok(Value::Bool(false));
                }
                let [v] = self.arity::<1>(id, args)?;
                Ok(Value::Bool(v.truthy()))
            }
            Chr => {
                let [v] = self.arity::<1>(id, args)?;
                let code = self.require_int(&v)?;
                let c = u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| rt("chr() arg not in range"))?;
                Ok(Value::str(c.to_string()))
            }
            Ord => {
                let [v] = self.arity::<1>(id, args)?;
                match &v {
                    Value::Str(s) if s.chars().count() == 1 => {
                        Ok(Value::Int(s.chars().next().unwrap() as i64))
                    }
                    _ => Err(rt("ord() expected a character")),
                }
            }
            Dict => {
                if args.is_empty() {
                    return Ok(Value::dict(Vec::new()));
                }
                let [v] = self.arity::<1>(id, args)?;
                match v {
                    Value::Dict(pairs) => Ok(Value::dict(pairs.borrow().clone())),
                    other => {
                        let entries = self.materialize(other)?;
                        let mut pairs: Vec<(Value, Value)> = Vec::new();
                        for entry in entries {
                            let pair = self.materialize(entry)?;
                            let [k, v]: [Value; 2] = pair.try_into().map_err(|_| {
                                rt("dict() expects an iterable of key/value pairs")
                            })?;
                            self.require_hashable(&k)?;
                            if let Some(slot) =
                                pairs.iter_mut().find(|(k2, _)| values_equal(k2, &k))
                            {
                                slot.1 = v;
                            } else {
                                pairs.push((k, v));
                            }
                        }
                        Ok(Value::dict(pairs))
                    }
                }
            }
            Divmod => {
                let [a, b] = self.arity::<2>(id, args)?;
                let q = operators::binary(BinOp::FloorDiv, &a, &b, &self.limits)?;
                let r = operators::binary(BinOp::Mod, &a, &b, &self.limits)?;
                Ok(Value::tuple(vec![q, r]))
            }
            Enumerate => {
                if args.is_empty() || args.len() > 2 {
                    return Err(rt("enumerate() takes 1 or 2 arguments"));
                }
                let mut args = args;
                let start = if args.len() == 2 {
                    self.require_int(&args.pop().unwrap())?
                } else {
                    0
                };
                let items = self.materialize(args.pop().unwrap())?;
                Ok(Value::list(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| Value::tuple(vec![Value::Int(start + i as i64), v]))
                        .collect(),
                ))
            }
            Filter => {
                let [f, iterable] = self.arity::<2>(id, args)?;
                let items = self.materialize(iterable)?;
                let mut out = Vec::new();
                for item in items {
                    self.tick()?;
                    let keep = match &f {
                        Value::None => item.truthy(),
                        callee => self
                            .call_value(callee.clone(), vec![item.clone()], Vec::new())?
                            .truthy(),
                    };
                    if keep {
                        out.push(item);
                    }
                }
                Ok(Value::list(out))
            }
            Map => {
                if args.len() < 2 {
                    return Err(rt("map() requires a function and an iterable"));
                }
                let mut args = args;
                let iterables: Vec<Vec<Value>> = args
                    .split_off(1)
                    .into_iter()
                    .map(|v| self.materialize(v))
                    .collect::<Exec<_>>()?;
                let f = args.pop().unwrap();
                let shortest = iterables.iter().map(Vec::len).min().unwrap_or(0);
                let mut out = Vec::with_capacity(shortest);
                for i in 0..shortest {
                    self.tick()?;
                    let call_args: Vec<Value> =
                        iterables.iter().map(|items| items[i].clone()).collect();
                    out.push(self.call_value(f.clone(), call_args, Vec::new())?);
                }
                Ok(Value::list(out))
            }
            Float => {
                if args.is_empty() {
                    return Ok(Value::Float(0.0));
                }
                let [v] = self.arity::<1>(id, args)?;
                match &v {
                    Value::Float(x) => Ok(Value::Float(*x)),
                    Value::Int(x) => Ok(Value::Float(*x as f64)),
                    Value::Bool(b) => Ok(Value::Float(*b as i64 as f64)),
                    Value::Str(s) => s
                        .trim()
                        .parse::<f64>()
                        .map(Value::Float)
                        .map_err(|_| rt(format!("could not convert string to float: {}", v.repr()))),
                    other => Err(rt(format!(
                        "float() argument must be a string or a number, not '{}'",
                        other.type_name()
                    ))),
                }
            }
            Int => {
                if args.is_empty() {
                    return Ok(Value::Int(0));
                }
                if args.len() == 2 {
                    let [v, base] = self.arity::<2>(id, args)?;
                    let base = self.require_int(&base)?;
                    let Value::Str(s) = &v else {
                        return Err(rt("int() can't convert non-string with explicit base"));
                    };
                    if !(2..=36).contains(&base) {
                        return Err(rt("int() base must be >= 2 and <= 36"));
                    }
                    return i64::from_str_radix(s.trim(), base as u32)
                        .map(Value::Int)
                        .map_err(|_| {
                            rt(format!(
                                "invalid literal for int() with base {base}: {}",
                                v.repr()
                            ))
                        });
                }
                let [v] = self.arity::<1>(id, args)?;
                match &v {
                    Value::Int(x) => Ok(Value::Int(*x)),
                    Value::Bool(b) => Ok(Value::Int(*b as i64)),
                    Value::Float(x) => Ok(Value::Int(x.trunc() as i64)),
                    Value::Str(s) => s
                        .trim()
                        .parse::<i64>()
                        .map(Value::Int)
                        .map_err(|_| {
                            rt(format!("invalid literal for int() with base 10: {}", v.repr()))
                        }),
                    other => Err(rt(format!(
                        "int() argument must be a string or a number, not '{}'",
                        other.type_name()
                    ))),
                }
            }
            Format => {
                if args.is_empty() || args.len() > 2 {
                    return Err(rt("format() takes 1 or 2 arguments"));
                }
                let mut args = args;
                let spec = if args.len() == 2 {
                    match args.pop().unwrap() {
                        Value::Str(s) => s.to_string(),
                        other => {
                            return Err(rt(format!(
                                "format() spec must be a string, not '{}'",
                                other.type_name()
                            )))
                        }
                    }
                } else {
                    String::new()
                };
                let value = args.pop().unwrap();
                format_with_spec(&value, &spec).map(Value::str).map_err(rt)
            }
            Isinstance => {
                let [v, class] = self.arity::<2>(id, args)?;
                let matches = match &class {
                    Value::Tuple(classes) => {
                        let mut found = false;
                        for class in classes.iter() {
                            if isinstance_check(&v, class)? {
                                found = true;
                                break;
                            }
                        }
                        found
                    }
                    class => isinstance_check(&v, class)?,
                };
                Ok(Value::Bool(matches))
            }
            Len => {
                let [v] = self.arity::<1>(id, args)?;
                let len = match &v {
                    Value::Str(s) => s.chars().count() as i64,
                    Value::List(items) => items.borrow().len() as i64,
                    Value::Tuple(items) => items.len() as i64,
                    Value::Dict(pairs) => pairs.borrow().len() as i64,
                    Value::Set(items) => items.borrow().len() as i64,
                    Value::Range { start, stop, step } => range_len(*start, *stop, *step),
                    other => {
                        return Err(rt(format!(
                            "object of type '{}' has no len()",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::Int(len))
            }
            List => {
                if args.is_empty() {
                    return Ok(Value::list(Vec::new()));
                }
                let [v] = self.arity::<1>(id, args)?;
                Ok(Value::list(self.materialize(v)?))
            }
            Tuple => {
                if args.is_empty() {
                    return Ok(Value::tuple(Vec::new()));
                }
                let [v] = self.arity::<1>(id, args)?;
                Ok(Value::tuple(self.materialize(v)?))
            }
            Set => {
                if args.is_empty() {
                    return Ok(Value::set(Vec::new()));
                }
                let [v] = self.arity::<1>(id, args)?;
                let items = self.materialize(v)?;
                let mut out: Vec<Value> = Vec::new();
                for item in items {
                    self.require_hashable(&item)?;
                    if !out.iter().any(|x| values_equal(x, &item)) {
                        out.push(item);
                    }
                }
                Ok(Value::set(out))
            }
            Max => self.min_max(args, kwargs, true),
            Min => self.min_max(args, kwargs, false),
            Print => {
                let mut sep = " ".to_string();
                let mut end = "\n".to_string();
                for (name, value) in kwargs {
                    match (name.as_str(), value) {
                        ("sep", Value::Str(s)) => sep = s.to_string(),
                        ("sep", Value::None) => sep = " ".to_string(),
                        ("end", Value::Str(s)) => end = s.to_string(),
                        ("end", Value::None) => end = "\n".to_string(),
                        (other, _) => {
                            return Err(rt(format!(
                                "print() got an unexpected keyword argument '{other}'"
                            )))
                        }
                    }
                }
                let rendered: Vec<String> = args.iter().map(Value::display).collect();
                let line = format!("{}{}", rendered.join(&sep), end);
                self.write_output(&line)?;
                Ok(Value::None)
            }
            Range => {
                let (start, stop, step) = match args.len() {
                    1 => (0, self.require_int(&args[0])?, 1),
                    2 => (
                        self.require_int(&args[0])?,
                        self.require_int(&args[1])?,
                        1,
                    ),
                    3 => (
                        self.require_int(&args[0])?,
                        self.require_int(&args[1])?,
                        self.require_int(&args[2])?,
                    ),
                    n => return Err(rt(format!("range() takes 1 to 3 arguments, got {n}"))),
                };
                if step == 0 {
                    return Err(rt("range() arg 3 must not be zero"));
                }
                Ok(Value::Range { start, stop, step })
            }
            Round => {
                if args.is_empty() || args.len() > 2 {
                    return Err(rt("round() takes 1 or 2 arguments"));
                }
                let mut args = args;
                let ndigits = if args.len() == 2 {
                    Some(self.require_int(&args.pop().unwrap())?)
                } else {
                    None
                };
                let v = args.pop().unwrap();
                match (&v, ndigits) {
                    (Value::Int(x), _) => Ok(Value::Int(*x)),
                    (Value::Bool(b), _) => Ok(Value::Int(*b as i64)),
                    (Value::Float(x), None) => {
                        let rounded = x.round_ties_even();
                        if rounded.abs() > i64::MAX as f64 {
                            return Err(rt("integer overflow"));
                        }
                        Ok(Value::Int(rounded as i64))
                    }
                    (Value::Float(x), Some(n)) => {
                        let factor = 10f64.powi(n.clamp(-18, 18) as i32);
                        Ok(Value::Float((x * factor).round_ties_even() / factor))
                    }
                    (other, _) => Err(rt(format!(
                        "type {} doesn't define __round__",
                        other.type_name()
                    ))),
                }
            }
            Sorted => {
                if args.len() != 1 {
                    return Err(rt("sorted() takes exactly one positional argument"));
                }
                let mut args = args;
                let items = self.materialize(args.pop().unwrap())?;
                let (key, reverse) = self.sort_options(kwargs)?;
                let sorted = self.sort_items(items, key, reverse)?;
                Ok(Value::list(sorted))
            }
            Str => {
                if args.is_empty() {
                    return Ok(Value::str(""));
                }
                let [v] = self.arity::<1>(id, args)?;
                Ok(Value::str(v.display()))
            }
            Sum => {
                if args.is_empty() || args.len() > 2 {
                    return Err(rt("sum() takes 1 or 2 arguments"));
                }
                let mut args = args;
                let start = if args.len() == 2 {
                    args.pop().unwrap()
                } else {
                    Value::Int(0)
                };
                if matches!(start, Value::Str(_)) {
                    return Err(rt("sum() can't sum strings (use ''.join(seq) instead)"));
                }
                let items = self.materialize(args.pop().unwrap())?;
                let mut acc = start;
                for item in items {
                    self.tick()?;
                    acc = operators::binary(BinOp::Add, &acc, &item, &self.limits)?;
                }
                Ok(acc)
            }
            Zip => {
                let iterables: Vec<Vec<Value>> = args
                    .into_iter()
                    .map(|v| self.materialize(v))
                    .collect::<Exec<_>>()?;
                let shortest = iterables.iter().map(Vec::len).min().unwrap_or(0);
                let mut out = Vec::with_capacity(shortest);
                for i in 0..shortest {
                    out.push(Value::tuple(
                        iterables.iter().map(|items| items[i].clone()).collect(),
                    ));
                }
                Ok(Value::list(out))
            }

            // math module subset
            Acos => self.float_fn(id, args, |x| x.acos(), true),
            Asin => self.float_fn(id, args, |x| x.asin(), true),
            Atan => self.float_fn(id, args, |x| x.atan(), false),
            Cos => self.float_fn(id, args, |x| x.cos(), false),
            Sin => self.float_fn(id, args, |x| x.sin(), false),
            Tan => self.float_fn(id, args, |x| x.tan(), false),
            Exp => self.float_fn(id, args, |x| x.exp(), false),
            Degrees => self.float_fn(id, args, |x| x.to_degrees(), false),
            Radians => self.float_fn(id, args, |x| x.to_radians(), false),
            Sqrt => {
                let [v] = self.arity::<1>(id, args)?;
                let x = self.require_float(&v)?;
                if x < 0.0 {
                    return Err(rt("math domain error"));
                }
                Ok(Value::Float(x.sqrt()))
            }
            Log => {
                if args.is_empty() || args.len() > 2 {
                    return Err(rt("log() takes 1 or 2 arguments"));
                }
                let mut args = args;
                let base = if args.len() == 2 {
                    Some(self.require_float(&args.pop().unwrap())?)
                } else {
                    None
                };
                let x = self.require_float(&args.pop().unwrap())?;
                if x <= 0.0 {
                    return Err(rt("math domain error"));
                }
                Ok(Value::Float(match base {
                    None => x.ln(),
                    Some(b) => x.log(b),
                }))
            }
            Log10 => {
                let [v] = self.arity::<1>(id, args)?;
                let x = self.require_float(&v)?;
                if x <= 0.0 {
                    return Err(rt("math domain error"));
                }
                Ok(Value::Float(x.log10()))
            }
            Ceil => {
                let [v] = self.arity::<1>(id, args)?;
                match &v {
                    Value::Int(x) => Ok(Value::Int(*x)),
                    Value::Bool(b) => Ok(Value::Int(*b as i64)),
                    Value::Float(x) => Ok(Value::Int(x.ceil() as i64)),
                    other => Err(rt(format!(
                        "must be real number, not '{}'",
                        other.type_name()
                    ))),
                }
            }
            Floor => {
                let [v] = self.arity::<1>(id, args)?;
                match &v {
                    Value::Int(x) => Ok(Value::Int(*x)),
                    Value::Bool(b) => Ok(Value::Int(*b as i64)),
                    Value::Float(x) => Ok(Value::Int(x.floor() as i64)),
                    other => Err(rt(format!(
                        "must be real number, not '{}'",
                        other.type_name()
                    ))),
                }
            }
            Factorial => {
                let [v] = self.arity::<1>(id, args)?;
                let n = self.require_int(&v)?;
                if n < 0 {
                    return Err(rt("factorial() not defined for negative values"));
                }
                let mut acc: i64 = 1;
                for i in 2..=n {
                    acc = acc
                        .checked_mul(i)
                        .ok_or_else(|| rt("integer overflow"))?;
                }
                Ok(Value::Int(acc))
            }
            MathPow => {
                let [a, b] = self.arity::<2>(id, args)?;
                let (x, y) = (self.require_float(&a)?, self.require_float(&b)?);
                Ok(Value::Float(x.powf(y)))
            }
        }
    }

    fn radix_builtin(
        &mut self,
        id: BuiltinId,
        args: Vec<Value>,
        radix: u32,
        prefix: &str,
    ) -> Exec<Value> {
        let [v] = self.arity::<1>(id, args)?;
        let n = self.require_int(&v)?;
        let digits = match radix {
            2 => format!("{:b}", n.unsigned_abs()),
            8 => format!("{:o}", n.unsigned_abs()),
            _ => format!("{:x}", n.unsigned_abs()),
        };
        let sign = if n < 0 { "-" } else { "" };
        Ok(Value::str(format!("{sign}{prefix}{digits}")))
    }

    fn float_fn(
        &mut self,
        id: BuiltinId,
        args: Vec<Value>,
        f: impl Fn(f64) -> f64,
        domain_bounded: bool,
    ) -> Exec<Value> {
        let [v] = self.arity::<1>(id, args)?;
        let x = self.require_float(&v)?;
        if domain_bounded && !(-1.0..=1.0).contains(&x) {
            return Err(rt("math domain error"));
        }
        Ok(Value::Float(f(x)))
    }

    fn min_max(
        &mut self,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
        is_max: bool,
    ) -> Exec<Value> {
        let name = if is_max { "max" } else { "min" };
        let mut key: Option<Value> = None;
        let mut fallback: Option<Value> = None;
        for (kw, value) in kwargs {
            match kw.as_str() {
                "key" => key = Some(value),
                "default" => fallback = Some(value),
                other => {
                    return Err(rt(format!(
                        "{name}() got an unexpected keyword argument '{other}'"
                    )))
                }
            }
        }
        let items = match args.len() {
            0 => return Err(rt(format!("{name}() expected at least 1 argument"))),
            1 => {
                let mut args = args;
                self.materialize(args.pop().unwrap())?
            }
            _ => args,
        };
        if items.is_empty() {
            return match fallback {
                Some(value) => Ok(value),
                None => Err(rt(format!("{name}() arg is an empty sequence"))),
            };
        }
        let mut best: Option<(Value, Value)> = None; // (key, item)
        for item in items {
            self.tick()?;
            let item_key = match &key {
                None => item.clone(),
                Some(f) => self.call_value(f.clone(), vec![item.clone()], Vec::new())?,
            };
            match &best {
                None => best = Some((item_key, item)),
                Some((best_key, _)) => {
                    let ordering = values_compare(&item_key, best_key).ok_or_else(|| {
                        rt(format!(
                            "'{}' not supported between instances of '{}' and '{}'",
                            if is_max { ">" } else { "<" },
                            item_key.type_name(),
                            best_key.type_name()
                        ))
                    })?;
                    let better = if is_max {
                        ordering == std::cmp::Ordering::Greater
                    } else {
                        ordering == std::cmp::Ordering::Less
                    };
                    if better {
                        best = Some((item_key, item));
                    }
                }
            }
        }
        Ok(best.expect("non-empty").1)
    }

    pub(crate) fn sort_options(
        &mut self,
        kwargs: Vec<(String, Value)>,
    ) -> Exec<(Option<Value>, bool)> {
        let mut key = None;
        let mut reverse = false;
        for (name, value) in kwargs {
            match name.as_str() {
                "key" => {
                    if !matches!(value, Value::None) {
                        key = Some(value);
                    }
                }
                "reverse" => reverse = value.truthy(),
                other => {
                    return Err(rt(format!(
                        "sort got an unexpected keyword argument '{other}'"
                    )))
                }
            }
        }
        Ok((key, reverse))
    }

    /// Stable sort with optional key function, faulting on incomparable
    /// elements.
    pub(crate) fn sort_items(
        &mut self,
        items: Vec<Value>,
        key: Option<Value>,
        reverse: bool,
    ) -> Exec<Vec<Value>> {
        let mut keyed: Vec<(Value, Value)> = Vec::with_capacity(items.len());
        for item in items {
            self.tick()?;
            let item_key = match &key {
                None => item.clone(),
                Some(f) => self.call_value(f.clone(), vec![item.clone()], Vec::new())?,
            };
            keyed.push((item_key, item));
        }
        let mut failure: Option<(String, String)> = None;
        keyed.sort_by(|(a, _), (b, _)| {
            values_compare(a, b).unwrap_or_else(|| {
                if failure.is_none() {
                    failure = Some((a.type_name().into(), b.type_name().into()));
                }
                std::cmp::Ordering::Equal
            })
        });
        if let Some((a, b)) = failure {
            return Err(rt(format!(
                "'<' not supported between instances of '{a}' and '{b}'"
            )));
        }
        if reverse {
            keyed.reverse();
        }
        Ok(keyed.into_iter().map(|(_, item)| item).collect())
    }

    /// Write to the captured output, converting overflow into a size fault.
    pub(crate) fn write_output(&mut self, text: &str) -> Exec<()> {
        self.output.push_str(text).map_err(|overflow| {
            Flow::Fault(ExecFault::Size(format!(
                "output exceeds {} bytes",
                overflow.max_bytes
            )))
        })
    }

    fn arity<const N: usize>(&self, id: BuiltinId, args: Vec<Value>) -> Exec<[Value; N]> {
        let len = args.len();
        args.try_into().map_err(|_| {
            rt(format!(
                "{}() takes exactly {N} argument{} ({len} given)",
                id.name(),
                if N == 1 { "" } else { "s" }
            ))
        })
    }

    pub(crate) fn require_int(&self, v: &Value) -> Exec<i64> {
        match v {
            Value::Int(x) => Ok(*x),
            Value::Bool(b) => Ok(*b as i64),
            other => Err(rt(format!(
                "an integer is required, not '{}'",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn require_float(&self, v: &Value) -> Exec<f64> {
        match v {
            Value::Float(x) => Ok(*x),
            Value::Int(x) => Ok(*x as f64),
            Value::Bool(b) => Ok(*b as i64 as f64),
            other => Err(rt(format!(
                "must be real number, not '{}'",
                other.type_name()
            ))),
        }
    }
}

/// Comprehension accumulator.
enum CompAcc {
    List(Vec<Value>),
    Generator(Vec<Value>),
    Set(Vec<Value>),
    Dict(Vec<(Value, Value)>),
}

impl CompAcc {
    fn new(kind: CompKind) -> Self {
        match kind {
            CompKind::List => CompAcc::List(Vec::new()),
            CompKind::Generator => CompAcc::Generator(Vec::new()),
            CompKind::Set => CompAcc::Set(Vec::new()),
            CompKind::Dict => CompAcc::Dict(Vec::new()),
        }
    }

    fn len(&self) -> usize {
        match self {
            CompAcc::List(v) | CompAcc::Generator(v) | CompAcc::Set(v) => v.len(),
            CompAcc::Dict(v) => v.len(),
        }
    }

    fn finish(self) -> Value {
        match self {
            CompAcc::List(items) | CompAcc::Generator(items) => Value::list(items),
            CompAcc::Set(items) => Value::set(items),
            CompAcc::Dict(pairs) => Value::dict(pairs),
        }
    }
}

/// Iterator over a value for `for` loops.
pub(crate) enum ValueIter {
    Items(std::vec::IntoIter<Value>),
    Range { current: i64, stop: i64, step: i64 },
}

impl ValueIter {
    pub(crate) fn next_item(&mut self) -> Option<Value> {
        match self {
            ValueIter::Items(iter) => iter.next(),
            ValueIter::Range {
                current,
                stop,
                step,
            } => {
                let more = if *step > 0 {
                    *current < *stop
                } else {
                    *current > *stop
                };
                if !more {
                    return None;
                }
                let value = *current;
                *current += *step;
                Some(Value::Int(value))
            }
        }
    }
}

/// `isinstance` check against a builtin type constructor.
fn isinstance_check(v: &Value, class: &Value) -> Exec<bool> {
    let Value::Builtin(id) = class else {
        return Err(rt("isinstance() arg 2 must be a type or tuple of types"));
    };
    Ok(match id {
        BuiltinId::Bool => matches!(v, Value::Bool(_)),
        // bool is a subtype of int.
        BuiltinId::Int => matches!(v, Value::Int(_) | Value::Bool(_)),
        BuiltinId::Float => matches!(v, Value::Float(_)),
        BuiltinId::Str => matches!(v, Value::Str(_)),
        BuiltinId::List => matches!(v, Value::List(_)),
        BuiltinId::Dict => matches!(v, Value::Dict(_)),
        BuiltinId::Set => matches!(v, Value::Set(_)),
        BuiltinId::Tuple => matches!(v, Value::Tuple(_)),
        BuiltinId::Range => matches!(v, Value::Range { .. }),
        _ => {
            return Err(rt("isinstance() arg 2 must be a type or tuple of types"));
        }
    })
}

/// Escape non-ASCII characters the way `ascii()` does.
fn ascii_repr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let code = c as u32;
            if code <= 0xff {
                out.push_str(&format!("\\x{code:02x}"));
            } else if code <= 0xffff {
                out.push_str(&format!("\\u{code:04x}"));
            } else {
                out.push_str(&format!("\\U{code:08x}"));
            }
        }
    }
    out
}

/// `format(value, spec)`: a practical subset of the format mini-language
/// (fill/align, zero pad, width, precision, types d/f/e/g/x/X/o/b/s).
fn format_with_spec(value: &Value, spec: &str) -> Result<String, String> {
    if spec.is_empty() {
        return Ok(value.display());
    }
    let chars: Vec<char> = spec.chars().collect();
    let mut pos = 0;

    let (mut fill, mut align) = (' ', None);
    if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
        fill = chars[0];
        align = Some(chars[1]);
        pos = 2;
    } else if !chars.is_empty() && matches!(chars[0], '<' | '>' | '^') {
        align = Some(chars[0]);
        pos = 1;
    }

    let mut zero_pad = false;
    if chars.get(pos) == Some(&'0') {
        zero_pad = true;
        pos += 1;
    }

    let mut width = 0usize;
    while let Some(c) = chars.get(pos) {
        if c.is_ascii_digit() {
            width = width * 10 + c.to_digit(10).unwrap() as usize;
            pos += 1;
        } else {
            break;
        }
    }

    let mut precision: Option<usize> = None;
    if chars.get(pos) == Some(&'.') {
        pos += 1;
        let mut p = 0usize;
        let mut any = false;
        while let Some(c) = chars.get(pos) {
            if c.is_ascii_digit() {
                p = p * 10 + c.to_digit(10).unwrap() as usize;
                pos += 1;
                any = true;
            } else {
                break;
            }
        }
        if !any {
            return Err(format!("invalid format spec '{spec}'"));
        }
        precision = Some(p);
    }

    let kind = match chars.get(pos) {
        None => None,
        Some(c) if pos + 1 == chars.len() => Some(*c),
        _ => return Err(format!("invalid format spec '{spec}'")),
    };

    let number = value.as_number();
    let body = match kind {
        None | Some('s') => match precision {
            Some(p) => value.display().chars().take(p).collect(),
            None => value.display(),
        },
        Some('d') => match number {
            Some(n) => match n {
                crate::sandbox::value::Number::Int(v) => v.to_string(),
                crate::sandbox::value::Number::Float(_) => {
                    return Err("unknown format code 'd' for object of type 'float'".into())
                }
            },
            None => return Err(format!("cannot format '{}' as 'd'", value.type_name())),
        },
        Some('f') => match number {
            Some(n) => format!("{:.*}", precision.unwrap_or(6), n.as_f64()),
            None => return Err(format!("cannot format '{}' as 'f'", value.type_name())),
        },
        Some('e') => match number {
            Some(n) => format!("{:.*e}", precision.unwrap_or(6), n.as_f64()),
            None => return Err(format!("cannot format '{}' as 'e'", value.type_name())),
        },
        Some('g') => match number {
            Some(n) => operators::stringify_number(n),
            None => return Err(format!("cannot format '{}' as 'g'", value.type_name())),
        },
        Some('x') => int_for_radix(value, |v| format!("{v:x}"))?,
        Some('X') => int_for_radix(value, |v| format!("{v:X}"))?,
        Some('o') => int_for_radix(value, |v| format!("{v:o}"))?,
        Some('b') => int_for_radix(value, |v| format!("{v:b}"))?,
        Some(other) => return Err(format!("unknown format code '{other}'")),
    };

    let body_len = body.chars().count();
    if body_len >= width {
        return Ok(body);
    }
    let pad = width - body_len;
    if zero_pad && align.is_none() && number.is_some() {
        if let Some(stripped) = body.strip_prefix('-') {
            return Ok(format!("-{}{}", "0".repeat(pad), stripped));
        }
        return Ok(format!("{}{}", "0".repeat(pad), body));
    }
    let align = align.unwrap_or(if number.is_some() { '>' } else { '<' });
    Ok(match align {
        '<' => format!("{}{}", body, fill.to_string().repeat(pad)),
        '>' => format!("{}{}", fill.to_string().repeat(pad), body),
        _ => {
            let left = pad / 2;
            format!(
                "{}{}{}",
                fill.to_string().repeat(left),
                body,
                fill.to_string().repeat(pad - left)
            )
        }
    })
}

fn int_for_radix(value: &Value, render: impl Fn(u64) -> String) -> Result<String, String> {
    match value {
        Value::Int(v) => {
            let digits = render(v.unsigned_abs());
            Ok(if *v < 0 {
                format!("-{digits}")
            } else {
                digits
            })
        }
        Value::Bool(b) => Ok(render(*b as u64)),
        other => Err(format!("cannot format '{}' as integer", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parser::parse;

    fn run_source(source: &str) -> Result<(Option<Value>, String), ExecFault> {
        let config = SandboxConfig::default();
        let program = parse(source, config.max_recursion_depth).expect("parse");
        let cancel = Arc::new(AtomicBool::new(false));
        let deadline = Instant::now() + config.timeout;
        let mut interp = Interpreter::new(&config, HashMap::new(), cancel, deadline);
        let value = interp.run(&program)?;
        let (_, output) = interp.into_parts();
        Ok((value, output))
    }

    fn eval_repr(source: &str) -> String {
        let (value, _) = run_source(source).expect("run");
        value.expect("expression value").repr()
    }

    fn run_err(source: &str) -> ExecFault {
        run_source(source).expect_err("expected fault")
    }

    #[test]
    fn test_arithmetic_expression() {
        assert_eq!(eval_repr("2 + 3 * 4"), "14");
        assert_eq!(eval_repr("2 ** 10"), "1024");
        assert_eq!(eval_repr("7 // 2"), "3");
        assert_eq!(eval_repr("7 / 2"), "3.5");
        assert_eq!(eval_repr("-7 % 3"), "2");
    }

    #[test]
    fn test_string_operations() {
        assert_eq!(eval_repr("'ab' + 'cd'"), "'abcd'");
        assert_eq!(eval_repr("'ab' * 3"), "'ababab'");
        assert_eq!(eval_repr("'hello'[1]"), "'e'");
        assert_eq!(eval_repr("'hello'[::-1]"), "'olleh'");
    }

    #[test]
    fn test_fstring() {
        assert_eq!(eval_repr("f'x={1 + 2}'"), "'x=3'");
    }

    #[test]
    fn test_collections_and_subscripts() {
        assert_eq!(eval_repr("[1, 2, 3][-1]"), "3");
        assert_eq!(eval_repr("(1, 2)[0]"), "1");
        assert_eq!(eval_repr("{'a': 1}['a']"), "1");
        assert_eq!(eval_repr("{1, 1, 2}"), "{1, 2}");
        assert_eq!(eval_repr("{'a': 1, 'a': 2}"), "{'a': 2}");
    }

    #[test]
    fn test_boolean_short_circuit() {
        // The failing division is never evaluated.
        assert_eq!(eval_repr("False and 1 / 0"), "False");
        assert_eq!(eval_repr("True or 1 / 0"), "True");
        assert_eq!(eval_repr("0 or 'fallback'"), "'fallback'");
    }

    #[test]
    fn test_chained_comparison() {
        assert_eq!(eval_repr("1 < 2 < 3"), "True");
        assert_eq!(eval_repr("1 < 2 > 5"), "False");
    }

    #[test]
    fn test_statements_and_state() {
        let (value, output) = run_source("x = 5\ny = x * 2\nprint(y)").unwrap();
        assert!(value.is_none());
        assert_eq!(output, "10\n");
    }

    #[test]
    fn test_aliasing_semantics() {
        let (_, output) = run_source("a = [1]\nb = a\nb.append(2)\nprint(a)").unwrap();
        assert_eq!(output, "[1, 2]\n");
    }

    #[test]
    fn test_if_while_for() {
        let (_, output) = run_source(
            "total = 0\nfor i in range(5):\n    if i % 2 == 0:\n        total += i\nprint(total)",
        )
        .unwrap();
        assert_eq!(output, "6\n");

        let (_, output) =
            run_source("n = 3\nwhile n > 0:\n    print(n)\n    n -= 1").unwrap();
        assert_eq!(output, "3\n2\n1\n");
    }

    #[test]
    fn test_break_continue() {
        let (_, output) = run_source(
            "for i in range(10):\n    if i == 3:\n        break\n    if i == 1:\n        continue\n    print(i)",
        )
        .unwrap();
        assert_eq!(output, "0\n2\n");
    }

    #[test]
    fn test_functions() {
        let (_, output) = run_source(
            "def fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\nprint(fib(10))",
        )
        .unwrap();
        assert_eq!(output, "55\n");
    }

    #[test]
    fn test_function_defaults_and_kwargs() {
        let (_, output) = run_source(
            "def greet(name, greeting='hello'):\n    return greeting + ' ' + name\nprint(greet('bob'))\nprint(greet('ann', greeting='hi'))",
        )
        .unwrap();
        assert_eq!(output, "hello bob\nhi ann\n");
    }

    #[test]
    fn test_comprehension_scope_does_not_leak() {
        let fault = run_err("q = [i for i in range(3)]\ni + 1");
        match fault {
            ExecFault::Runtime(msg) => assert!(msg.contains("'i' is not defined")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_comprehensions() {
        assert_eq!(eval_repr("[x * x for x in range(4)]"), "[0, 1, 4, 9]");
        assert_eq!(
            eval_repr("{k: len(k) for k in ['a', 'bb']}"),
            "{'a': 1, 'bb': 2}"
        );
        assert_eq!(eval_repr("sum(x for x in range(5))"), "10");
        assert_eq!(
            eval_repr("[i * j for i in range(1, 3) for j in range(1, 3)]"),
            "[1, 2, 2, 4]"
        );
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval_repr("len('hello')"), "5");
        assert_eq!(eval_repr("sorted([3, 1, 2])"), "[1, 2, 3]");
        assert_eq!(eval_repr("sorted([3, 1, 2], reverse=True)"), "[3, 2, 1]");
        assert_eq!(eval_repr("max([1, 9, 4])"), "9");
        assert_eq!(eval_repr("min(5, 2, 8)"), "2");
        assert_eq!(eval_repr("sum([1, 2, 3])"), "6");
        assert_eq!(eval_repr("list(zip([1, 2], ['a', 'b']))"), "[(1, 'a'), (2, 'b')]");
        assert_eq!(eval_repr("list(enumerate(['a', 'b']))"), "[(0, 'a'), (1, 'b')]");
        assert_eq!(eval_repr("abs(-3)"), "3");
        assert_eq!(eval_repr("int('42')"), "42");
        assert_eq!(eval_repr("int('ff', 16)"), "255");
        assert_eq!(eval_repr("float('2.5')"), "2.5");
        assert_eq!(eval_repr("str(42)"), "'42'");
        assert_eq!(eval_repr("bin(5)"), "'0b101'");
        assert_eq!(eval_repr("hex(255)"), "'0xff'");
        assert_eq!(eval_repr("chr(65)"), "'A'");
        assert_eq!(eval_repr("ord('A')"), "65");
        assert_eq!(eval_repr("divmod(7, 2)"), "(3, 1)");
        assert_eq!(eval_repr("round(2.5)"), "2");
        assert_eq!(eval_repr("round(3.14159, 2)"), "3.14");
        assert_eq!(eval_repr("isinstance(True, int)"), "True");
        assert_eq!(eval_repr("isinstance('x', (int, str))"), "True");
        assert_eq!(eval_repr("all([1, 2])"), "True");
        assert_eq!(eval_repr("any([0, 0])"), "False");
    }

    #[test]
    fn test_math_builtins() {
        assert_eq!(eval_repr("sqrt(16)"), "4.0");
        assert_eq!(eval_repr("floor(2.7)"), "2");
        assert_eq!(eval_repr("ceil(2.1)"), "3");
        assert_eq!(eval_repr("factorial(5)"), "120");
        assert_eq!(eval_repr("pow(2, 3)"), "8.0");
        match run_err("sqrt(-1)") {
            ExecFault::Runtime(msg) => assert!(msg.contains("math domain error")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_map_filter_with_user_function() {
        let (_, output) = run_source(
            "def double(x):\n    return x * 2\nprint(map(double, [1, 2, 3]))\nprint(filter(None, [0, 1, '', 'a']))",
        )
        .unwrap();
        assert_eq!(output, "[2, 4, 6]\n[1, 'a']\n");
    }

    #[test]
    fn test_sorted_with_key_function() {
        let (_, output) = run_source(
            "def last(pair):\n    return pair[1]\nprint(sorted([(1, 'b'), (2, 'a')], key=last))",
        )
        .unwrap();
        assert_eq!(output, "[(2, 'a'), (1, 'b')]\n");
    }

    #[test]
    fn test_print_sep_end() {
        let (_, output) = run_source("print(1, 2, 3, sep='-', end='!')").unwrap();
        assert_eq!(output, "1-2-3!");
    }

    #[test]
    fn test_runtime_faults() {
        match run_err("undefined_name") {
            ExecFault::Runtime(msg) => assert_eq!(msg, "name 'undefined_name' is not defined"),
            other => panic!("unexpected {other:?}"),
        }
        match run_err("1 / 0") {
            ExecFault::Runtime(msg) => assert!(msg.contains("division by zero")),
            other => panic!("unexpected {other:?}"),
        }
        match run_err("1 + 'a'") {
            ExecFault::Runtime(msg) => assert!(msg.contains("unsupported operand")),
            other => panic!("unexpected {other:?}"),
        }
        match run_err("{}['missing']") {
            ExecFault::Runtime(msg) => assert!(msg.contains("KeyError")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_recursion_depth_bounded() {
        match run_err("def f():\n    return f()\nf()") {
            ExecFault::Runtime(msg) => assert!(msg.contains("recursion depth")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_loop_iteration_budget() {
        let config = SandboxConfig::builder().max_loop_iterations(100).build();
        let program = parse("n = 0\nwhile True:\n    n += 1", 64).unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut interp = Interpreter::new(
            &config,
            HashMap::new(),
            cancel,
            Instant::now() + config.timeout,
        );
        match interp.run(&program) {
            Err(ExecFault::Runtime(msg)) => assert!(msg.contains("iteration limit")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_fuel_budget() {
        let config = SandboxConfig::builder()
            .max_fuel(1_000)
            .max_loop_iterations(1_000_000)
            .build();
        let program = parse("n = 0\nwhile True:\n    n += 1", 64).unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut interp = Interpreter::new(
            &config,
            HashMap::new(),
            cancel,
            Instant::now() + config.timeout,
        );
        match interp.run(&program) {
            Err(ExecFault::Runtime(msg)) => assert!(msg.contains("budget")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cancel_flag_interrupts() {
        let config = SandboxConfig::builder()
            .max_fuel(u64::MAX)
            .max_loop_iterations(u64::MAX)
            .build();
        let program = parse("n = 0\nwhile True:\n    n += 1", 64).unwrap();
        let cancel = Arc::new(AtomicBool::new(true));
        let mut interp = Interpreter::new(
            &config,
            HashMap::new(),
            cancel,
            Instant::now() + std::time::Duration::from_secs(1000),
        );
        assert!(matches!(interp.run(&program), Err(ExecFault::Deadline)));
    }

    #[test]
    fn test_output_ceiling() {
        let config = SandboxConfig::builder().max_output_bytes(16).build();
        let program = parse("for i in range(100):\n    print('xxxxxxxx')", 64).unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut interp = Interpreter::new(
            &config,
            HashMap::new(),
            cancel,
            Instant::now() + config.timeout,
        );
        assert!(matches!(interp.run(&program), Err(ExecFault::Size(_))));
    }

    #[test]
    fn test_tuple_unpacking() {
        let (_, output) = run_source("a, b = 1, 2\na, b = b, a\nprint(a, b)").unwrap();
        assert_eq!(output, "2 1\n");
    }

    #[test]
    fn test_subscript_assignment() {
        let (_, output) =
            run_source("xs = [1, 2, 3]\nxs[0] = 9\nd = {}\nd['k'] = 1\nprint(xs, d)").unwrap();
        assert_eq!(output, "[9, 2, 3] {'k': 1}\n");
    }

    #[test]
    fn test_conditional_expression() {
        assert_eq!(eval_repr("'big' if 10 > 5 else 'small'"), "'big'");
    }

    #[test]
    fn test_format_builtin() {
        assert_eq!(eval_repr("format(3.14159, '.2f')"), "'3.14'");
        assert_eq!(eval_repr("format(42, '06d')"), "'000042'");
        assert_eq!(eval_repr("format(255, 'x')"), "'ff'");
        assert_eq!(eval_repr("format('hi', '>5')"), "'   hi'");
    }

    #[test]
    fn test_repetition_cap_is_size_fault() {
        assert!(matches!(run_err("'x' * 10**7"), ExecFault::Size(_)));
    }
}
