//! Async tree-walking evaluator.
//!
//! Scoping is dynamic: a name resolves through the active call frames from
//! innermost to global, then to builtins. That is enough for the scripts the
//! bridge runs in tests, where helpers are defined inside the wrapper routine.

use std::{collections::HashMap, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use scriptbridge_core::{
    ArtifactSource, Canvas, Channel, FsError, GuestException, GuestFs, GuestHost, GuestValue,
    Namespace,
};

use crate::{
    ast::{BinOp, Expr, FunctionDef, Handler, Literal, Stmt},
    value::{Builtin, Value},
};

/// Signature prefixed to `plot` figures so they pass PNG sniffing.
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub enum Flow {
    Raise(GuestException),
    Return(Value),
}

type Exec<'s> = BoxFuture<'s, Result<(), Flow>>;
type Eval<'s> = BoxFuture<'s, Result<Value, Flow>>;

fn raise<T>(kind: &str, message: impl Into<String>) -> Result<T, Flow> {
    Err(Flow::Raise(GuestException::new(kind, message)))
}

fn is_exception_name(name: &str) -> bool {
    name.ends_with("Error") || name.ends_with("Exception") || name == "KeyboardInterrupt"
}

pub struct Machine<'h, 'a> {
    host: &'h mut GuestHost<'a>,
    fs: &'h mut dyn GuestFs,
    canvas: Canvas,
    frames: Vec<HashMap<String, Value>>,
    handling: Vec<GuestException>,
    max_depth: usize,
}

impl<'h, 'a> Machine<'h, 'a> {
    pub fn new(
        host: &'h mut GuestHost<'a>,
        fs: &'h mut dyn GuestFs,
        canvas: Canvas,
        globals: &Namespace,
        max_depth: usize,
    ) -> Self {
        let globals = globals
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_guest(GuestValue::from_wire(v.clone()))))
            .collect();
        Self {
            host,
            fs,
            canvas,
            frames: vec![globals],
            handling: Vec::new(),
            max_depth,
        }
    }

    /// Run a whole program. A top-level `return` ends it quietly.
    pub async fn run(&mut self, program: &[Stmt]) -> Result<(), GuestException> {
        match self.exec_block(program).await {
            Ok(()) | Err(Flow::Return(_)) => Ok(()),
            Err(Flow::Raise(exc)) => Err(exc),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, Flow> {
        if let Some(value) = self.frames.iter().rev().find_map(|frame| frame.get(name)) {
            return Ok(value.clone());
        }
        if let Some(builtin) = Builtin::lookup(name) {
            return Ok(Value::Builtin(builtin));
        }
        match name {
            "sys" => Ok(Value::Module("sys".into())),
            n if is_exception_name(n) => Ok(Value::ExceptionClass(n.into())),
            n => raise("NameError", format!("name '{n}' is not defined")),
        }
    }

    fn assign(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    fn exec_block<'s>(&'s mut self, body: &'s [Stmt]) -> Exec<'s> {
        async move {
            for stmt in body {
                self.exec(stmt).await?;
            }
            Ok(())
        }
        .boxed()
    }

    fn exec<'s>(&'s mut self, stmt: &'s Stmt) -> Exec<'s> {
        async move {
            match stmt {
                Stmt::Expr(expr) => {
                    self.eval(expr).await?;
                }
                Stmt::Assign(name, expr) => {
                    let value = self.eval(expr).await?;
                    self.assign(name, value);
                }
                Stmt::Pass | Stmt::Import => {}
                Stmt::Return(expr) => {
                    let value = match expr {
                        Some(expr) => self.eval(expr).await?,
                        None => Value::None,
                    };
                    return Err(Flow::Return(value));
                }
                Stmt::Raise(expr) => return Err(self.raise_statement(expr.as_ref()).await),
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    if self.eval(cond).await?.is_truthy() {
                        self.exec_block(then).await?;
                    } else {
                        self.exec_block(otherwise).await?;
                    }
                }
                Stmt::Def(def) => {
                    self.assign(&def.name, Value::Function(Arc::clone(def)));
                }
                Stmt::Try {
                    body,
                    handlers,
                    finally,
                } => {
                    let outcome = match self.exec_block(body).await {
                        Err(Flow::Raise(exc)) => self.handle(exc, handlers).await,
                        other => other,
                    };
                    self.exec_block(finally).await?;
                    outcome?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    async fn raise_statement(&mut self, expr: Option<&Expr>) -> Flow {
        let Some(expr) = expr else {
            return match self.handling.last() {
                Some(exc) => Flow::Raise(exc.clone()),
                None => Flow::Raise(GuestException::new("RuntimeError", "No active exception to reraise")),
            };
        };
        match self.eval(expr).await {
            Ok(Value::Exception(exc)) => Flow::Raise(exc),
            Ok(Value::ExceptionClass(kind)) => Flow::Raise(GuestException::new(kind, "")),
            Ok(_) => Flow::Raise(GuestException::new(
                "TypeError",
                "exceptions must derive from BaseException",
            )),
            Err(flow) => flow,
        }
    }

    async fn handle(&mut self, exc: GuestException, handlers: &[Handler]) -> Result<(), Flow> {
        let Some(handler) = handlers.iter().find(|h| {
            h.kind
                .as_deref()
                .is_none_or(|kind| matches!(kind, "Exception" | "BaseException") || kind == exc.kind)
        }) else {
            return Err(Flow::Raise(exc));
        };
        if let Some(name) = &handler.binding {
            self.assign(name, Value::Exception(exc.clone()));
        }
        self.handling.push(exc);
        let result = self.exec_block(&handler.body).await;
        self.handling.pop();
        result
    }

    fn eval<'s>(&'s mut self, expr: &'s Expr) -> Eval<'s> {
        async move {
            match expr {
                Expr::Literal(lit) => Ok(match lit {
                    Literal::None => Value::None,
                    Literal::Bool(b) => Value::Bool(*b),
                    Literal::Int(n) => Value::Int(*n),
                    Literal::Float(f) => Value::Float(*f),
                    Literal::Str(s) => Value::Str(s.clone()),
                }),
                Expr::Name(name) => self.lookup(name),
                Expr::List(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval(item).await?);
                    }
                    Ok(Value::List(values))
                }
                Expr::Dict(entries) => {
                    let mut map: Vec<(String, Value)> = Vec::with_capacity(entries.len());
                    for (key, value) in entries {
                        let key = match self.eval(key).await? {
                            Value::Str(s) => s,
                            other => {
                                return raise(
                                    "TypeError",
                                    format!("dict keys must be str, not {}", other.type_name()),
                                );
                            }
                        };
                        let value = self.eval(value).await?;
                        match map.iter_mut().find(|(k, _)| *k == key) {
                            Some(slot) => slot.1 = value,
                            None => map.push((key, value)),
                        }
                    }
                    Ok(Value::Dict(map))
                }
                Expr::Call { func, args, kwargs } => {
                    let callee = self.eval(func).await?;
                    if callee == Value::Builtin(Builtin::Input) {
                        return raise(
                            "RuntimeError",
                            "input() must be awaited; this script was not prepared for interactive input",
                        );
                    }
                    let (args, kwargs) = self.eval_arguments(args, kwargs).await?;
                    self.call(callee, args, kwargs).await
                }
                Expr::Attr(base, attr) => {
                    let base = self.eval(base).await?;
                    match (&base, attr.as_str()) {
                        (Value::Module(m), "stdout") if m == "sys" => Ok(Value::Stream(Channel::Stdout)),
                        (Value::Module(m), "stderr") if m == "sys" => Ok(Value::Stream(Channel::Stderr)),
                        (Value::Exception(exc), "args") => Ok(Value::List(vec![Value::Str(exc.message.clone())])),
                        _ => raise(
                            "AttributeError",
                            format!("'{}' object has no attribute '{attr}'", base.type_name()),
                        ),
                    }
                }
                Expr::Index(base, index) => {
                    let base = self.eval(base).await?;
                    let index = self.eval(index).await?;
                    subscript(&base, &index)
                }
                Expr::Await(inner) => self.eval_await(inner).await,
                Expr::Neg(inner) => match self.eval(inner).await? {
                    Value::Int(n) => n
                        .checked_neg()
                        .map(Value::Int)
                        .map_or_else(|| raise("OverflowError", "integer overflow"), Ok),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => raise(
                        "TypeError",
                        format!("bad operand type for unary -: '{}'", other.type_name()),
                    ),
                },
                Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner).await?.is_truthy())),
                Expr::Binary(left, op, right) => {
                    let left = self.eval(left).await?;
                    let right = self.eval(right).await?;
                    binary(&left, *op, &right)
                }
            }
        }
        .boxed()
    }

    async fn eval_arguments(
        &mut self,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<(Vec<Value>, Vec<(String, Value)>), Flow> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg).await?);
        }
        let mut named = Vec::with_capacity(kwargs.len());
        for (name, expr) in kwargs {
            named.push((name.clone(), self.eval(expr).await?));
        }
        Ok((values, named))
    }

    async fn eval_await(&mut self, inner: &Expr) -> Result<Value, Flow> {
        if let Expr::Call { func, args, kwargs } = inner {
            let callee = self.eval(func).await?;
            let (args, kwargs) = self.eval_arguments(args, kwargs).await?;
            if callee == Value::Builtin(Builtin::Input) {
                no_keywords("input", &kwargs)?;
                let prompt = args.first().map(Value::display).unwrap_or_default();
                return match self.host.input(&prompt).await {
                    Ok(line) => Ok(Value::Str(line)),
                    Err(e) => Err(Flow::Raise(e.into())),
                };
            }
            let awaitable = self.call(callee, args, kwargs).await?;
            return self.resume(awaitable).await;
        }
        let awaitable = self.eval(inner).await?;
        self.resume(awaitable).await
    }

    async fn resume(&mut self, awaitable: Value) -> Result<Value, Flow> {
        match awaitable {
            Value::Coroutine(def, args) => self.invoke(&def, args).await,
            other => raise(
                "TypeError",
                format!("object {} can't be used in 'await' expression", other.type_name()),
            ),
        }
    }

    async fn call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, Flow> {
        match callee {
            Value::Builtin(builtin) => self.call_builtin(builtin, args, kwargs),
            Value::Function(def) => {
                no_keywords(&def.name, &kwargs)?;
                if def.is_async {
                    return Ok(Value::Coroutine(def, args));
                }
                self.invoke(&def, args).await
            }
            Value::ExceptionClass(kind) => {
                let message = args.first().map(Value::display).unwrap_or_default();
                Ok(Value::Exception(GuestException::new(kind, message)))
            }
            other => raise(
                "TypeError",
                format!("'{}' object is not callable", other.type_name()),
            ),
        }
    }

    async fn invoke(&mut self, def: &Arc<FunctionDef>, args: Vec<Value>) -> Result<Value, Flow> {
        if args.len() != def.params.len() {
            return raise(
                "TypeError",
                format!(
                    "{}() takes {} positional arguments but {} were given",
                    def.name,
                    def.params.len(),
                    args.len()
                ),
            );
        }
        if self.frames.len() > self.max_depth {
            return raise("RecursionError", "maximum recursion depth exceeded");
        }
        self.frames
            .push(def.params.iter().cloned().zip(args).collect());
        let result = self.exec_block(&def.body).await;
        self.frames.pop();
        match result {
            Ok(()) => Ok(Value::None),
            Err(Flow::Return(value)) => Ok(value),
            Err(flow) => Err(flow),
        }
    }

    fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, Flow> {
        if builtin != Builtin::Print {
            no_keywords(builtin.name(), &kwargs)?;
        }
        match builtin {
            Builtin::Print => self.print(&args, kwargs),
            Builtin::SendResult => {
                let value = single_arg(builtin, args)?;
                self.host
                    .send_result(value.to_guest())
                    .map_err(|e| Flow::Raise(e.into()))?;
                Ok(Value::None)
            }
            Builtin::Str => Ok(Value::Str(
                args.first().map(Value::display).unwrap_or_default(),
            )),
            Builtin::Len => match single_arg(builtin, args)? {
                Value::Str(s) => Ok(Value::Int(count(s.chars().count()))),
                Value::List(items) => Ok(Value::Int(count(items.len()))),
                Value::Dict(entries) => Ok(Value::Int(count(entries.len()))),
                other => raise(
                    "TypeError",
                    format!("object of type '{}' has no len()", other.type_name()),
                ),
            },
            Builtin::Int => to_int(single_arg(builtin, args)?),
            Builtin::ReportException => match single_arg(builtin, args)? {
                Value::Exception(exc) => {
                    self.host.report_exception(exc);
                    Ok(Value::None)
                }
                other => raise(
                    "TypeError",
                    format!("expected an exception, got {}", other.type_name()),
                ),
            },
            Builtin::Plot => {
                let label = single_arg(builtin, args)?.display();
                let mut bytes = PNG_SIGNATURE.to_vec();
                bytes.extend_from_slice(label.as_bytes());
                self.canvas.push(ArtifactSource::Raster(bytes));
                Ok(Value::None)
            }
            Builtin::PlotRaw => {
                let data = single_arg(builtin, args)?.display();
                self.canvas.push(ArtifactSource::Raster(data.into_bytes()));
                Ok(Value::None)
            }
            Builtin::Scene => {
                let description = single_arg(builtin, args)?
                    .to_guest()
                    .to_wire()
                    .map_err(|e| Flow::Raise(GuestException::new("TypeError", e.to_string())))?;
                self.canvas.push(ArtifactSource::Scene(description));
                Ok(Value::None)
            }
            Builtin::ReadFile => match single_arg(builtin, args)? {
                Value::Str(path) => self.fs.read_file(&path).map(Value::Str).map_err(os_error),
                other => raise(
                    "TypeError",
                    format!("path must be str, not {}", other.type_name()),
                ),
            },
            Builtin::WriteFile => match <[Value; 2]>::try_from(args) {
                Ok([Value::Str(path), Value::Str(content)]) => {
                    self.fs.write_file(&path, &content).map_err(os_error)?;
                    Ok(Value::Int(count(content.chars().count())))
                }
                Ok(_) => raise("TypeError", "write_file() arguments must be str"),
                Err(args) => raise(
                    "TypeError",
                    format!("write_file() takes exactly 2 arguments ({} given)", args.len()),
                ),
            },
            Builtin::Input => raise("RuntimeError", "input() must be awaited"),
        }
    }

    fn print(&mut self, args: &[Value], kwargs: Vec<(String, Value)>) -> Result<Value, Flow> {
        let mut end = "\n".to_string();
        let mut sep = " ".to_string();
        let mut channel = Channel::Stdout;
        for (name, value) in kwargs {
            match (name.as_str(), value) {
                ("end", Value::Str(s)) => end = s,
                ("sep", Value::Str(s)) => sep = s,
                ("end" | "sep", Value::None) => {}
                ("file", Value::Stream(c)) => channel = c,
                ("flush", _) => {}
                (other, _) => {
                    return raise(
                        "TypeError",
                        format!("'{other}' is an invalid keyword argument for print()"),
                    );
                }
            }
        }
        let mut line = args.iter().map(Value::display).collect::<Vec<_>>().join(&sep);
        line.push_str(&end);
        self.host.write(channel, &line);
        Ok(Value::None)
    }
}

fn no_keywords(name: &str, kwargs: &[(String, Value)]) -> Result<(), Flow> {
    match kwargs.first() {
        Some((key, _)) => raise(
            "TypeError",
            format!("{name}() got an unexpected keyword argument '{key}'"),
        ),
        None => Ok(()),
    }
}

fn single_arg(builtin: Builtin, args: Vec<Value>) -> Result<Value, Flow> {
    let given = args.len();
    let mut args = args.into_iter();
    match (args.next(), given) {
        (Some(value), 1) => Ok(value),
        _ => raise(
            "TypeError",
            format!("{}() takes exactly one argument ({given} given)", builtin.name()),
        ),
    }
}

fn os_error(err: FsError) -> Flow {
    let kind = match err {
        FsError::NotFound(_) => "FileNotFoundError",
        FsError::IsADirectory(_) => "IsADirectoryError",
        FsError::NotADirectory(_) => "NotADirectoryError",
        FsError::AlreadyExists(_) => "FileExistsError",
        _ => "OSError",
    };
    Flow::Raise(GuestException::new(kind, err.to_string()))
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[allow(clippy::cast_possible_truncation)]
fn to_int(value: Value) -> Result<Value, Flow> {
    match value {
        Value::Int(n) => Ok(Value::Int(n)),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Value::Str(s) => s.trim().parse().map(Value::Int).or_else(|_| {
            raise(
                "ValueError",
                format!("invalid literal for int() with base 10: {}", Value::Str(s.clone()).repr()),
            )
        }),
        other => raise(
            "TypeError",
            format!("int() argument must be a string or a number, not '{}'", other.type_name()),
        ),
    }
}

fn subscript(base: &Value, index: &Value) -> Result<Value, Flow> {
    match (base, index) {
        (Value::List(items), Value::Int(i)) => position(*i, items.len())
            .and_then(|i| items.get(i).cloned())
            .map_or_else(|| raise("IndexError", "list index out of range"), Ok),
        (Value::Str(s), Value::Int(i)) => position(*i, s.chars().count())
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::Str(c.to_string()))
            .map_or_else(|| raise("IndexError", "string index out of range"), Ok),
        (Value::Dict(entries), Value::Str(key)) => entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .map_or_else(|| raise("KeyError", index.repr()), Ok),
        _ => raise(
            "TypeError",
            format!("'{}' object is not subscriptable by {}", base.type_name(), index.type_name()),
        ),
    }
}

fn position(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { len + index } else { index };
    usize::try_from(resolved).ok().filter(|_| resolved < len)
}

#[allow(clippy::cast_precision_loss)]
fn binary(left: &Value, op: BinOp, right: &Value) -> Result<Value, Flow> {
    let overflow = || raise("OverflowError", "integer overflow");
    match (op, left, right) {
        (BinOp::Eq, l, r) => Ok(Value::Bool(l.loose_eq(r))),
        (BinOp::NotEq, l, r) => Ok(Value::Bool(!l.loose_eq(r))),
        (BinOp::Add, Value::Int(a), Value::Int(b)) => a.checked_add(*b).map_or_else(overflow, |n| Ok(Value::Int(n))),
        (BinOp::Sub, Value::Int(a), Value::Int(b)) => a.checked_sub(*b).map_or_else(overflow, |n| Ok(Value::Int(n))),
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (BinOp::Add, Value::List(a), Value::List(b)) => Ok(Value::List(a.iter().chain(b).cloned().collect())),
        (op, l, r) => {
            let as_float = |v: &Value| match v {
                Value::Int(n) => Some(*n as f64),
                Value::Float(f) => Some(*f),
                _ => None,
            };
            match (as_float(l), as_float(r), op) {
                (Some(a), Some(b), BinOp::Add) => Ok(Value::Float(a + b)),
                (Some(a), Some(b), BinOp::Sub) => Ok(Value::Float(a - b)),
                _ => {
                    let symbol = if op == BinOp::Add { "+" } else { "-" };
                    raise(
                        "TypeError",
                        format!(
                            "unsupported operand type(s) for {symbol}: '{}' and '{}'",
                            l.type_name(),
                            r.type_name()
                        ),
                    )
                }
            }
        }
    }
}
