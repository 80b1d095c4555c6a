use std::{cell::RefCell, collections::HashSet, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, FunctionDecl, Literal, LogicalOp, Stmt, StmtKind, UnaryOp},
    builtins,
    diagnostics::{Diagnostic, Result},
    lexer::tokenize,
    parser::parse,
    stack::{CallStack, StackFrame},
    value::{FunctionValue, RuntimeFn, Value, ValueKind},
};

/// Knobs for a single `Interpreter` instance.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Emit `Error` events for uncaught diagnostics.
    pub debug: bool,
    /// Emit `Call`/`Return` events around user function calls (implies
    /// `Error` events too).
    pub trace: bool,
    /// Abort with a runtime error once this many statements have executed.
    pub max_steps: Option<u64>,
    /// Pin `now()` and `math.random()` to fixed values.
    pub deterministic: bool,
}

/// Observability events delivered to hooks registered with
/// [`Interpreter::on`].
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A `say` statement (or the `print` builtin) produced a line of output.
    Output(String),
    /// A user function is being entered, with the call-site position.
    Call { name: String, line: u32, column: u32 },
    /// A user function returned.
    Return { name: String },
    /// An uncaught diagnostic is propagating out of `interpret`.
    Error(String),
}

pub type Hook = Box<dyn FnMut(&RuntimeEvent)>;

/// Shared fan-out point for runtime events. Cloned into builtins that
/// produce output so they report through the same hooks as `say`.
#[derive(Clone, Default)]
pub struct Emitter {
    hooks: Rc<RefCell<Vec<Hook>>>,
}

impl Emitter {
    pub fn emit(&self, event: &RuntimeEvent) {
        for hook in self.hooks.borrow_mut().iter_mut() {
            hook(event);
        }
    }

    fn register(&self, hook: Hook) {
        self.hooks.borrow_mut().push(hook);
    }
}

type Resolver = Box<dyn FnMut(&str) -> Option<String>>;

/// One environment frame: name bindings plus the set of names declared
/// `const` in this frame.
#[derive(Clone, Default)]
struct Frame {
    bindings: IndexMap<String, Value>,
    consts: HashSet<String>,
}

/// Statement outcome carried in the `Ok` channel so `break`, `continue`,
/// and `return` bypass user-level `try/catch`.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Tree-walking evaluator.
///
/// Owns the environment stack, the flat function table, the builtin tables,
/// the module cache, and the call stack. Calls are by frame copy: the callee
/// starts from a copy of the caller's top frame, and its writes do not leak
/// back.
pub struct Interpreter {
    env_stack: Vec<Frame>,
    functions: IndexMap<String, Rc<FunctionDecl>>,
    builtins: IndexMap<String, RuntimeFn>,
    custom_builtins: IndexMap<String, RuntimeFn>,
    call_stack: CallStack,
    modules: IndexMap<String, IndexMap<String, Value>>,
    exports: IndexMap<String, Value>,
    resolver: Option<Resolver>,
    emitter: Emitter,
    options: RuntimeOptions,
    steps: u64,
    file_path: Option<String>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(RuntimeOptions::default())
    }
}

impl Interpreter {
    pub fn new(options: RuntimeOptions) -> Self {
        let emitter = Emitter::default();
        let builtins = builtins::install(emitter.clone(), options.deterministic);
        let mut modules = IndexMap::new();
        modules.insert("math".to_string(), builtins::math_module(options.deterministic));
        Self {
            env_stack: vec![Frame::default()],
            functions: IndexMap::new(),
            builtins,
            custom_builtins: IndexMap::new(),
            call_stack: CallStack::new(),
            modules,
            exports: IndexMap::new(),
            resolver: None,
            emitter,
            options,
            steps: 0,
            file_path: None,
        }
    }

    /// Registers a host builtin callable from scripts. Host builtins shadow
    /// user function declarations of the same name.
    pub fn register_builtin(&mut self, name: impl Into<String>, callback: RuntimeFn) {
        self.custom_builtins.insert(name.into(), callback);
    }

    /// Registers an event hook. Hooks receive `Output` events always, and
    /// `Call`/`Return`/`Error` events per [`RuntimeOptions`].
    pub fn on<F>(&mut self, hook: F)
    where
        F: FnMut(&RuntimeEvent) + 'static,
    {
        self.emitter.register(Box::new(hook));
    }

    /// Installs a module source resolver consulted by `use`/`import` when a
    /// module is not already cached.
    pub fn set_resolver<F>(&mut self, resolver: F)
    where
        F: FnMut(&str) -> Option<String> + 'static,
    {
        self.resolver = Some(Box::new(resolver));
    }

    /// Seeds the module cache with pre-built exports.
    pub fn load_module(&mut self, name: impl Into<String>, exports: IndexMap<String, Value>) {
        self.modules.insert(name.into(), exports);
    }

    /// Names this unit has `export`ed so far.
    pub fn exports(&self) -> &IndexMap<String, Value> {
        &self.exports
    }

    pub fn stack_trace(&self) -> Vec<StackFrame> {
        self.call_stack.stack_trace()
    }

    /// Tokenizes, parses, and interprets a source unit in one step.
    pub fn eval_source(&mut self, source: &str, file_path: Option<&str>) -> Result<Value> {
        self.file_path = file_path.map(str::to_string);
        let tokens = tokenize(source, file_path)?;
        let program = parse(tokens, file_path)?;
        self.interpret(&program)
    }

    /// Executes a program. Returns the value of a top-level `return`, or
    /// Null when the program falls off the end.
    pub fn interpret(&mut self, program: &[Stmt]) -> Result<Value> {
        self.steps = 0;
        match self.run_program(program) {
            Ok(value) => Ok(value),
            Err(mut diagnostic) => {
                if diagnostic.stack_trace.is_empty() {
                    diagnostic = diagnostic.with_stack_trace(self.call_stack.stack_trace());
                }
                if diagnostic.file.is_none() {
                    if let Some(file) = &self.file_path {
                        diagnostic = diagnostic.with_file(file.clone());
                    }
                }
                if self.options.debug || self.options.trace {
                    self.emitter
                        .emit(&RuntimeEvent::Error(diagnostic.message.clone()));
                }
                self.call_stack.clear();
                Err(diagnostic.into())
            }
        }
    }

    fn run_program(&mut self, program: &[Stmt]) -> std::result::Result<Value, Diagnostic> {
        for stmt in program {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                Flow::Return(value) => return Ok(value),
                Flow::Break => {
                    return Err(self.error(stmt.line, stmt.column, "Cannot use 'break' outside of a loop"))
                }
                Flow::Continue => {
                    return Err(self.error(stmt.line, stmt.column, "Cannot use 'continue' outside of a loop"))
                }
            }
        }
        Ok(Value::null())
    }

    fn exec_block(&mut self, body: &[Stmt]) -> std::result::Result<Flow, Diagnostic> {
        for stmt in body {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> std::result::Result<Flow, Diagnostic> {
        self.steps += 1;
        if let Some(max) = self.options.max_steps {
            if self.steps > max {
                return Err(self.error(stmt.line, stmt.column, "Execution step limit exceeded"));
            }
        }
        match &stmt.kind {
            StmtKind::Say(expression) => {
                let value = self.eval_expr(expression)?;
                self.emitter.emit(&RuntimeEvent::Output(value.to_string()));
                Ok(Flow::Normal)
            }
            StmtKind::Set { name, expression } => {
                if self.top_frame().consts.contains(name) {
                    return Err(self.error(
                        stmt.line,
                        stmt.column,
                        format!("Cannot reassign const variable '{name}'"),
                    ));
                }
                let value = self.eval_expr(expression)?;
                self.top_frame_mut().bindings.insert(name.clone(), value);
                Ok(Flow::Normal)
            }
            StmtKind::Const { name, expression } => {
                if self.top_frame().consts.contains(name) {
                    return Err(self.error(
                        stmt.line,
                        stmt.column,
                        format!("Cannot reassign const variable '{name}'"),
                    ));
                }
                let value = self.eval_expr(expression)?;
                let frame = self.top_frame_mut();
                frame.bindings.insert(name.clone(), value);
                frame.consts.insert(name.clone());
                Ok(Flow::Normal)
            }
            StmtKind::Check {
                condition,
                body,
                else_body,
            } => {
                if self.eval_condition(condition)? {
                    self.exec_block(body)
                } else if let Some(else_body) = else_body {
                    self.exec_block(else_body)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::Loop { condition, body } => {
                while self.eval_condition(condition)? {
                    match self.exec_block(body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::For {
                variable,
                iterable,
                body,
            } => self.exec_for(variable, iterable, body),
            StmtKind::Function(decl) => {
                self.functions.insert(decl.name.clone(), decl.clone());
                Ok(Flow::Normal)
            }
            StmtKind::Return(expression) => {
                let value = match expression {
                    Some(expression) => self.eval_expr(expression)?,
                    None => Value::null(),
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Try {
                body,
                catch,
                finally,
            } => self.exec_try(body, catch.as_ref(), finally.as_deref()),
            StmtKind::Switch {
                subject,
                cases,
                default,
            } => {
                let subject = self.eval_expr(subject)?.to_string();
                for case in cases {
                    if self.eval_expr(&case.value)?.to_string() == subject {
                        return self.exec_block(&case.body);
                    }
                }
                if let Some(default) = default {
                    return self.exec_block(default);
                }
                Ok(Flow::Normal)
            }
            StmtKind::Export { name, expression } => {
                // `export name` without an expression re-exports an existing
                // binding, or a declared function of that name.
                let value = match expression {
                    Some(expression) => self.eval_expr(expression)?,
                    None => match self.top_frame().bindings.get(name) {
                        Some(value) => value.clone(),
                        None => match self.functions.get(name) {
                            Some(decl) => Value::declared_fn(decl.clone()),
                            None => {
                                return Err(self
                                    .error(
                                        stmt.line,
                                        stmt.column,
                                        format!("Undefined variable '{name}'"),
                                    )
                                    .with_hint("Make sure the variable is defined before use"))
                            }
                        },
                    },
                };
                self.top_frame_mut()
                    .bindings
                    .insert(name.clone(), value.clone());
                self.exports.insert(name.clone(), value);
                Ok(Flow::Normal)
            }
            StmtKind::Use { module, names } => {
                self.ensure_module(module, stmt.line, stmt.column)?;
                let exports = self.modules.get(module).cloned().unwrap_or_default();
                for name in names {
                    let value = match exports.get(name) {
                        Some(value) => value.clone(),
                        None => {
                            return Err(self.error(
                                stmt.line,
                                stmt.column,
                                format!("Module '{module}' has no export '{name}'"),
                            ))
                        }
                    };
                    self.top_frame_mut().bindings.insert(name.clone(), value);
                }
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_for(
        &mut self,
        variable: &str,
        iterable: &Expr,
        body: &[Stmt],
    ) -> std::result::Result<Flow, Diagnostic> {
        let ExprKind::Range { start, end } = &iterable.kind else {
            return Err(self.error(
                iterable.line,
                iterable.column,
                "For loop range must be a range expression",
            ));
        };
        let (start, end) = self.eval_range_bounds(start, end, iterable)?;
        let mut i = start;
        while i <= end {
            self.top_frame_mut()
                .bindings
                .insert(variable.to_string(), Value::number(i));
            match self.exec_block(body)? {
                Flow::Normal | Flow::Continue => {}
                Flow::Break => break,
                flow @ Flow::Return(_) => return Ok(flow),
            }
            i += 1.0;
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        catch: Option<&(String, Vec<Stmt>)>,
        finally: Option<&[Stmt]>,
    ) -> std::result::Result<Flow, Diagnostic> {
        let outcome = match self.exec_block(body) {
            Ok(flow) => Ok(flow),
            Err(diagnostic) => match catch {
                Some((parameter, catch_body)) => {
                    let mut frame = self.top_frame().clone();
                    frame
                        .bindings
                        .insert(parameter.clone(), Value::string(diagnostic.message));
                    self.env_stack.push(frame);
                    let caught = self.exec_block(catch_body);
                    self.env_stack.pop();
                    caught
                }
                None => Err(diagnostic),
            },
        };
        // finally runs exactly once on every path; its own abrupt outcome
        // wins over the try/catch outcome.
        if let Some(finally) = finally {
            match self.exec_block(finally)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        outcome
    }

    fn ensure_module(
        &mut self,
        name: &str,
        line: u32,
        column: u32,
    ) -> std::result::Result<(), Diagnostic> {
        if self.modules.contains_key(name) {
            return Ok(());
        }
        let source = match self.resolver.as_mut() {
            Some(resolver) => resolver(name),
            None => None,
        };
        let Some(source) = source else {
            return Err(self.error(line, column, format!("Module '{name}' not found")));
        };
        // Run the module in its own interpreter so its bindings stay
        // isolated; only its exports are cached.
        let mut module_interpreter = Interpreter::new(self.options.clone());
        if let Err(error) = module_interpreter.eval_source(&source, Some(name)) {
            return Err(self.error(
                line,
                column,
                format!("Failed to load module '{name}': {error}"),
            ));
        }
        self.modules
            .insert(name.to_string(), module_interpreter.exports);
        Ok(())
    }

    fn eval_expr(&mut self, expr: &Expr) -> std::result::Result<Value, Diagnostic> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::Number(n) => Value::number(*n),
                Literal::Str(s) => Value::string(s.clone()),
                Literal::Bool(b) => Value::bool(*b),
                Literal::Null => Value::null(),
            }),
            ExprKind::Variable(name) => match self.top_frame().bindings.get(name) {
                Some(value) => Ok(value.clone()),
                None => Err(self
                    .error(expr.line, expr.column, format!("Undefined variable '{name}'"))
                    .with_hint("Make sure the variable is defined before use")),
            },
            ExprKind::Binary { op, left, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                self.eval_binary(*op, &left, &right, expr)
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.eval_expr(left)?;
                match op {
                    LogicalOp::And => {
                        if !left.is_truthy() {
                            return Ok(Value::bool(false));
                        }
                        let right = self.eval_expr(right)?;
                        Ok(Value::bool(right.is_truthy()))
                    }
                    LogicalOp::Or => {
                        if left.is_truthy() {
                            return Ok(Value::bool(true));
                        }
                        let right = self.eval_expr(right)?;
                        Ok(Value::bool(right.is_truthy()))
                    }
                }
            }
            ExprKind::Unary { op, expr: operand } => {
                let value = self.eval_expr(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::bool(!value.is_truthy())),
                    UnaryOp::Negate => match value.as_number() {
                        Some(n) => Ok(Value::number(-n)),
                        None => Err(self.error(
                            expr.line,
                            expr.column,
                            "Operator '-' requires a number operand",
                        )),
                    },
                }
            }
            ExprKind::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_expr(condition)?.is_truthy() {
                    self.eval_expr(then_branch)
                } else {
                    self.eval_expr(else_branch)
                }
            }
            ExprKind::NilCoalescing { left, right } => {
                let left = self.eval_expr(left)?;
                if left.is_null() {
                    self.eval_expr(right)
                } else {
                    Ok(left)
                }
            }
            ExprKind::OptionalChain { object, property } => {
                let object = self.eval_expr(object)?;
                match &*object.0 {
                    ValueKind::Null => Ok(Value::null()),
                    ValueKind::Object(entries) => {
                        Ok(entries.get(property).cloned().unwrap_or_else(Value::null))
                    }
                    _ => Err(self.error(
                        expr.line,
                        expr.column,
                        "Optional chaining only on objects",
                    )),
                }
            }
            ExprKind::Range { start, end } => {
                let (start, end) = self.eval_range_bounds(start, end, expr)?;
                let mut elements = Vec::new();
                let mut i = start;
                while i <= end {
                    elements.push(Value::number(i));
                    i += 1.0;
                }
                Ok(Value::array(elements))
            }
            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expr(element)?);
                }
                Ok(Value::array(values))
            }
            ExprKind::Object(properties) => {
                let mut entries = IndexMap::new();
                for (key, value) in properties {
                    let value = self.eval_expr(value)?;
                    entries.insert(key.clone(), value);
                }
                Ok(Value::object(entries))
            }
            ExprKind::Index { object, index } => self.eval_index(object, index, expr),
            ExprKind::Call { name, args } => self.eval_call(name, args, expr.line, expr.column),
            ExprKind::Await(operand) => self.eval_expr(operand),
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
        at: &Expr,
    ) -> std::result::Result<Value, Diagnostic> {
        if op == BinaryOp::Add {
            if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
                return Ok(Value::number(a + b));
            }
            if left.as_str().is_some() || right.as_str().is_some() {
                return Ok(Value::string(format!("{left}{right}")));
            }
            return Err(self.error(at.line, at.column, "Invalid operands for +"));
        }
        if matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
            let equal = left.to_string() == right.to_string();
            return Ok(Value::bool(if op == BinaryOp::Equal { equal } else { !equal }));
        }
        let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
            return Err(self.error(
                at.line,
                at.column,
                format!("Operator '{}' requires number operands", op.symbol()),
            ));
        };
        Ok(match op {
            BinaryOp::Sub => Value::number(a - b),
            BinaryOp::Mul => Value::number(a * b),
            BinaryOp::Div => Value::number(a / b),
            BinaryOp::Mod => Value::number(a % b),
            BinaryOp::Greater => Value::bool(a > b),
            BinaryOp::Less => Value::bool(a < b),
            BinaryOp::GreaterEqual => Value::bool(a >= b),
            BinaryOp::LessEqual => Value::bool(a <= b),
            BinaryOp::Add | BinaryOp::Equal | BinaryOp::NotEqual => unreachable!(),
        })
    }

    fn eval_index(
        &mut self,
        object: &Expr,
        index: &Expr,
        at: &Expr,
    ) -> std::result::Result<Value, Diagnostic> {
        let object = self.eval_expr(object)?;
        let index = self.eval_expr(index)?;
        match &*object.0 {
            ValueKind::Array(elements) => {
                let Some(i) = index.as_number() else {
                    return Err(self.error(at.line, at.column, "Array index must be a number"));
                };
                // NaN fails the fract test too, so `a[0/0]` lands here
                // instead of saturating to index 0.
                if i.fract() != 0.0 || i < 0.0 || i >= elements.len() as f64 {
                    return Err(self.error(
                        at.line,
                        at.column,
                        format!(
                            "Cannot access index {} on array of length {}",
                            crate::value::format_number(i),
                            elements.len()
                        ),
                    ));
                }
                Ok(elements[i as usize].clone())
            }
            ValueKind::Object(entries) => {
                let Some(key) = index.as_str() else {
                    return Err(self.error(at.line, at.column, "Object key must be a string"));
                };
                match entries.get(key) {
                    Some(value) => Ok(value.clone()),
                    None => {
                        let available = entries
                            .keys()
                            .map(String::as_str)
                            .collect::<Vec<_>>()
                            .join(", ");
                        Err(self
                            .error(
                                at.line,
                                at.column,
                                format!("Key \"{key}\" does not exist on object"),
                            )
                            .with_hint(format!("Available keys: {available}")))
                    }
                }
            }
            _ => Err(self.error(at.line, at.column, "Can only index arrays and objects")),
        }
    }

    fn eval_call(
        &mut self,
        name: &str,
        args: &[Expr],
        line: u32,
        column: u32,
    ) -> std::result::Result<Value, Diagnostic> {
        // Builtins shadow user declarations; host builtins shadow
        // caller-registered ones.
        let builtin = self
            .builtins
            .get(name)
            .or_else(|| self.custom_builtins.get(name))
            .cloned();
        if let Some(builtin) = builtin {
            let values = self.eval_args(args)?;
            return builtin(&values).map_err(|diagnostic| self.place(diagnostic, line, column));
        }
        if let Some(decl) = self.functions.get(name).cloned() {
            let values = self.eval_args(args)?;
            return self.call_declared(&decl, &values, line, column);
        }
        // A function-typed binding in the current frame is callable too.
        if let Some(value) = self.top_frame().bindings.get(name).cloned() {
            if let ValueKind::Function(function) = &*value.0 {
                let function = function.clone();
                let values = self.eval_args(args)?;
                return match function {
                    FunctionValue::Native(native) => (native.callback)(&values)
                        .map_err(|diagnostic| self.place(diagnostic, line, column)),
                    FunctionValue::Declared(decl) => {
                        self.call_declared(&decl, &values, line, column)
                    }
                };
            }
        }
        Err(self
            .error(line, column, format!("Undefined function '{name}'"))
            .with_hint("Make sure the function is defined before use"))
    }

    fn eval_args(&mut self, args: &[Expr]) -> std::result::Result<Vec<Value>, Diagnostic> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg)?);
        }
        Ok(values)
    }

    fn call_declared(
        &mut self,
        decl: &Rc<FunctionDecl>,
        args: &[Value],
        line: u32,
        column: u32,
    ) -> std::result::Result<Value, Diagnostic> {
        self.check_arity(decl, args.len(), line, column)?;
        // Call by frame copy: the callee starts from a copy of the caller's
        // top frame.
        let mut frame = self.top_frame().clone();
        for (param, value) in decl.params.iter().zip(args.iter()) {
            frame.bindings.insert(param.name.clone(), value.clone());
        }
        self.env_stack.push(frame);
        self.call_stack.push(StackFrame {
            function_name: decl.name.clone(),
            line,
            column,
        });
        if self.options.trace {
            self.emitter.emit(&RuntimeEvent::Call {
                name: decl.name.clone(),
                line,
                column,
            });
        }
        // Default evaluation and the body share one fallible path so both
        // stacks are popped on every exit, including erroring ones.
        let flow = self.enter_function(decl, args);
        let result = match flow {
            Ok(Flow::Return(value)) => Ok(value),
            Ok(Flow::Normal) => Ok(Value::null()),
            Ok(Flow::Break) => Err(self.error(line, column, "Cannot use 'break' outside of a loop")),
            Ok(Flow::Continue) => {
                Err(self.error(line, column, "Cannot use 'continue' outside of a loop"))
            }
            Err(mut diagnostic) => {
                if diagnostic.stack_trace.is_empty() {
                    diagnostic = diagnostic.with_stack_trace(self.call_stack.stack_trace());
                }
                Err(diagnostic)
            }
        };
        if self.options.trace {
            self.emitter.emit(&RuntimeEvent::Return {
                name: decl.name.clone(),
            });
        }
        self.call_stack.pop();
        self.env_stack.pop();
        result
    }

    /// Binds default and rest parameters in the already-pushed callee frame,
    /// then runs the body. Errors return to [`call_declared`], which owns the
    /// stack pops.
    fn enter_function(
        &mut self,
        decl: &Rc<FunctionDecl>,
        args: &[Value],
    ) -> std::result::Result<Flow, Diagnostic> {
        // Defaults for omitted trailing parameters evaluate in the callee's
        // frame.
        for param in decl.params.iter().skip(args.len()) {
            let value = match &param.default {
                Some(expr) => self.eval_expr(expr)?,
                None => Value::null(),
            };
            self.top_frame_mut()
                .bindings
                .insert(param.name.clone(), value);
        }
        if let Some(rest) = &decl.rest {
            let extra = args.iter().skip(decl.params.len()).cloned().collect();
            self.top_frame_mut()
                .bindings
                .insert(rest.clone(), Value::array(extra));
        }
        self.exec_block(&decl.body)
    }

    fn check_arity(
        &self,
        decl: &FunctionDecl,
        supplied: usize,
        line: u32,
        column: u32,
    ) -> std::result::Result<(), Diagnostic> {
        let required = decl.params.iter().filter(|p| p.default.is_none()).count();
        if supplied < required {
            let expected = if required == decl.params.len() && decl.rest.is_none() {
                format!("{required}")
            } else {
                format!("at least {required}")
            };
            return Err(self.error(
                line,
                column,
                format!(
                    "Function '{}' expects {expected} arguments, got {supplied}",
                    decl.name
                ),
            ));
        }
        if decl.rest.is_none() && supplied > decl.params.len() {
            let max = decl.params.len();
            let expected = if required == max {
                format!("{max}")
            } else {
                format!("at most {max}")
            };
            return Err(self.error(
                line,
                column,
                format!(
                    "Function '{}' expects {expected} arguments, got {supplied}",
                    decl.name
                ),
            ));
        }
        Ok(())
    }

    fn eval_condition(&mut self, condition: &Expr) -> std::result::Result<bool, Diagnostic> {
        let value = self.eval_expr(condition)?;
        match &*value.0 {
            ValueKind::Bool(b) => Ok(*b),
            _ => Err(self.error(
                condition.line,
                condition.column,
                "Condition must evaluate to boolean",
            )),
        }
    }

    fn eval_range_bounds(
        &mut self,
        start: &Expr,
        end: &Expr,
        at: &Expr,
    ) -> std::result::Result<(f64, f64), Diagnostic> {
        let start = self.eval_expr(start)?;
        let end = self.eval_expr(end)?;
        match (start.as_number(), end.as_number()) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(self.error(at.line, at.column, "Range start and end must be numbers")),
        }
    }

    fn top_frame(&self) -> &Frame {
        // env_stack always holds at least the global frame.
        self.env_stack.last().unwrap_or_else(|| unreachable!())
    }

    fn top_frame_mut(&mut self) -> &mut Frame {
        self.env_stack.last_mut().unwrap_or_else(|| unreachable!())
    }

    fn error(&self, line: u32, column: u32, message: impl Into<String>) -> Diagnostic {
        let mut diagnostic = Diagnostic::runtime(message).with_position(line, column);
        if let Some(file) = &self.file_path {
            diagnostic = diagnostic.with_file(file.clone());
        }
        diagnostic
    }

    fn place(&self, diagnostic: Diagnostic, line: u32, column: u32) -> Diagnostic {
        if diagnostic.line.is_none() {
            let mut placed = self.error(line, column, diagnostic.message);
            if let Some(hint) = diagnostic.hint {
                placed = placed.with_hint(hint);
            }
            placed
        } else {
            diagnostic
        }
    }
}
