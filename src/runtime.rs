use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    ast::{BinaryOp, Chunk, Expr, ExprKind, Literal, Stmt, StmtKind, UnaryOp},
    diagnostics::{BouquetError, Diagnostic, Result, SourceSpan},
    environment::{Environment, EnvironmentRef},
    loader::Module,
    value::{Value, ValueKind},
};

/// How a chunk stopped running.
#[derive(Debug, Clone)]
pub enum Completion {
    /// A top-level `return` ran.
    Returned(Value),
    /// Fell off the end; carries the value of the last expression statement.
    Finished(Option<Value>),
}

impl Completion {
    pub fn into_value(self) -> Value {
        match self {
            Completion::Returned(value) | Completion::Finished(Some(value)) => value,
            Completion::Finished(None) => Value::unit(),
        }
    }
}

/// Tree-walking evaluator for one chunk inside one module.
pub struct Interpreter<'m> {
    module: &'m Module,
    env: EnvironmentRef,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module, env: EnvironmentRef) -> Self {
        Self { module, env }
    }

    pub fn run(&mut self, chunk: &Chunk) -> Result<Completion> {
        let mut last_value = None;
        for stmt in &chunk.items {
            match self.execute_statement(stmt)? {
                FlowControl::Next => {}
                FlowControl::NextValue(value) => last_value = Some(value),
                FlowControl::Return(value) => return Ok(Completion::Returned(value)),
            }
        }
        Ok(Completion::Finished(last_value))
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Result<FlowControl> {
        match &stmt.kind {
            StmtKind::VarDecl {
                name,
                mutable,
                initializer,
            } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::unit(),
                };
                self.env.borrow_mut().define(name.clone(), value, *mutable);
                Ok(FlowControl::Next)
            }
            StmtKind::ConstDecl { name, value } => {
                let evaluated = self.evaluate(value)?;
                self.env.borrow_mut().define(name.clone(), evaluated, false);
                Ok(FlowControl::Next)
            }
            StmtKind::Expr(expr) => Ok(FlowControl::NextValue(self.evaluate(expr)?)),
            StmtKind::Block(statements) => self.execute_block(statements),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute_block(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute_block(else_branch)
                } else {
                    Ok(FlowControl::Next)
                }
            }
            StmtKind::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let flow @ FlowControl::Return(_) = self.execute_block(body)? {
                        return Ok(flow);
                    }
                }
                Ok(FlowControl::Next)
            }
            StmtKind::For {
                binding,
                iterable,
                body,
            } => {
                let collection = self.evaluate(iterable)?;
                let items = iterate(collection, iterable.span)?;
                for item in items {
                    let scope = Environment::with_parent(Rc::clone(&self.env));
                    scope.borrow_mut().define(binding.clone(), item, true);
                    if let flow @ FlowControl::Return(_) = self.execute_in(scope, body)? {
                        return Ok(flow);
                    }
                }
                Ok(FlowControl::Next)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::unit(),
                };
                Ok(FlowControl::Return(value))
            }
        }
    }

    fn execute_block(&mut self, statements: &[Stmt]) -> Result<FlowControl> {
        let scope = Environment::with_parent(Rc::clone(&self.env));
        self.execute_in(scope, statements)
    }

    fn execute_in(&mut self, scope: EnvironmentRef, statements: &[Stmt]) -> Result<FlowControl> {
        let prev = std::mem::replace(&mut self.env, scope);
        let result = self.execute_all(statements);
        self.env = prev;
        result
    }

    fn execute_all(&mut self, statements: &[Stmt]) -> Result<FlowControl> {
        let mut last_value = None;
        for stmt in statements {
            match self.execute_statement(stmt)? {
                FlowControl::Next => {}
                FlowControl::NextValue(value) => last_value = Some(value),
                flow @ FlowControl::Return(_) => return Ok(flow),
            }
        }
        Ok(last_value.map_or(FlowControl::Next, FlowControl::NextValue))
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(literal(lit)),
            ExprKind::Variable(name) => Environment::get(&self.env, name, expr.span),
            ExprKind::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let truthy = self.evaluate(left)?.is_truthy() && self.evaluate(right)?.is_truthy();
                Ok(Value::bool(truthy))
            }
            ExprKind::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                let truthy = self.evaluate(left)?.is_truthy() || self.evaluate(right)?.is_truthy();
                Ok(Value::bool(truthy))
            }
            ExprKind::Binary { op, left, right } => {
                let left_value = self.evaluate(left)?;
                let right_value = self.evaluate(right)?;
                binary(*op, left_value, right_value, expr.span)
            }
            ExprKind::Unary { op, expr: operand } => {
                let value = self.evaluate(operand)?;
                unary(*op, value, expr.span)
            }
            ExprKind::Assign { target, value } => {
                let value = self.evaluate(value)?;
                match &target.kind {
                    ExprKind::Variable(name) => {
                        Environment::assign(&self.env, name, value.clone(), target.span)?;
                    }
                    ExprKind::Field {
                        target: owner,
                        field,
                    } => self.assign_field(owner, field, value.clone(), target.span)?,
                    ExprKind::Index {
                        target: owner,
                        index,
                    } => self.assign_index(owner, index, value.clone())?,
                    _ => return Err(runtime_error("invalid assignment target", target.span)),
                }
                Ok(value)
            }
            ExprKind::Call { callee, args } => {
                let callee_value = self.evaluate(callee)?;
                let mut eval_args = Vec::with_capacity(args.len());
                for arg in args {
                    eval_args.push(self.evaluate(arg)?);
                }
                self.call(callee_value, eval_args, expr.span)
            }
            ExprKind::ArrayLiteral(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element)?);
                }
                Ok(Value::array(values))
            }
            ExprKind::MapLiteral(entries) => {
                let mut map = IndexMap::new();
                for (key, value_expr) in entries {
                    let value = self.evaluate(value_expr)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::map(map))
            }
            ExprKind::Group(inner) => self.evaluate(inner),
            ExprKind::Index { target, index } => {
                let target_value = self.evaluate(target)?;
                let index_value = self.evaluate(index)?;
                index_into(target_value, index_value, expr.span)
            }
            ExprKind::Field { target, field } => {
                let target_value = self.evaluate(target)?;
                field_of(target_value, field, expr.span)
            }
        }
    }

    fn call(&mut self, callee: Value, args: Vec<Value>, span: SourceSpan) -> Result<Value> {
        let result = match &*callee.0 {
            ValueKind::NativeFunction(fun) => fun.call(&args),
            ValueKind::RecordType(record_type) => record_type.construct(&args).map(Value::record),
            ValueKind::Import => match args.as_slice() {
                [name] => {
                    let name = name.expect_string(span)?;
                    self.module.import(name)
                }
                _ => Err(BouquetError::runtime(format!(
                    "`import` expected 1 argument but received {}",
                    args.len()
                ))),
            },
            _ => {
                return Err(runtime_error(
                    format!("value of type {} is not callable", callee.type_name()),
                    span,
                ));
            }
        };
        result.map_err(|err| attach_span(err, span))
    }

    fn assign_index(&mut self, target: &Expr, index: &Expr, value: Value) -> Result<()> {
        let target_value = self.evaluate(target)?;
        let ValueKind::Array(elements) = &*target_value.0 else {
            return Err(runtime_error(
                "index assignment expects array target",
                target.span,
            ));
        };
        let idx_value = self.evaluate(index)?;
        let idx = array_slot(&idx_value, elements.len(), index.span)?;
        let mut new_elements = elements.clone();
        new_elements[idx] = value;
        self.write_back(target, Value::array(new_elements))
    }

    fn assign_field(
        &mut self,
        target: &Expr,
        field: &str,
        value: Value,
        span: SourceSpan,
    ) -> Result<()> {
        let target_value = self.evaluate(target)?;
        match &*target_value.0 {
            ValueKind::Record(record) => record
                .set(field, (!value.is_unit()).then_some(value))
                .map_err(|err| attach_span(err, span)),
            ValueKind::Map(map) => {
                let mut new_map = map.clone();
                new_map.insert(field.to_string(), value);
                self.write_back(target, Value::map(new_map))
            }
            _ => Err(runtime_error(
                format!(
                    "field assignment expects Map or Record target, found {}",
                    target_value.type_name()
                ),
                target.span,
            )),
        }
    }

    /// Stores an updated copy of a map or array back into the place it was
    /// read from.
    fn write_back(&mut self, target: &Expr, new_value: Value) -> Result<()> {
        match &target.kind {
            ExprKind::Variable(name) => Environment::assign(&self.env, name, new_value, target.span),
            ExprKind::Group(inner) => self.write_back(inner, new_value),
            ExprKind::Field {
                target: owner,
                field,
            } => self.assign_field(owner, field, new_value, target.span),
            ExprKind::Index {
                target: owner,
                index,
            } => self.assign_index(owner, index, new_value),
            _ => Err(runtime_error(
                "cannot assign to computed expression",
                target.span,
            )),
        }
    }
}

enum FlowControl {
    Next,
    NextValue(Value),
    Return(Value),
}

fn iterate(value: Value, span: SourceSpan) -> Result<Vec<Value>> {
    match &*value.0 {
        ValueKind::Array(values) => Ok(values.clone()),
        ValueKind::String(text) => Ok(text
            .chars()
            .map(|ch| Value::string(ch.to_string()))
            .collect()),
        ValueKind::Map(map) => Ok(map
            .iter()
            .map(|(key, value)| Value::array(vec![Value::string(key.clone()), value.clone()]))
            .collect()),
        ValueKind::Record(record) => Ok(record
            .fields()
            .into_iter()
            .map(|(field, value)| {
                Value::array(vec![Value::string(field), value.unwrap_or_else(Value::unit)])
            })
            .collect()),
        _ => Err(runtime_error(
            format!("value of type {} is not iterable", value.type_name()),
            span,
        )),
    }
}

fn literal(literal: &Literal) -> Value {
    match literal {
        Literal::Int(n) => Value::int(*n),
        Literal::Float(n) => Value::float(*n),
        Literal::Bool(b) => Value::bool(*b),
        Literal::String(s) => Value::string(s.clone()),
        Literal::None => Value::unit(),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value, span: SourceSpan) -> Result<Value> {
    use BinaryOp::*;
    match op {
        Add => match (&*left.0, &*right.0) {
            (ValueKind::String(a), ValueKind::String(b)) => Ok(Value::string(format!("{a}{b}"))),
            _ => numeric(&left, &right, span, i64::checked_add, |a, b| a + b),
        },
        Sub => numeric(&left, &right, span, i64::checked_sub, |a, b| a - b),
        Mul => numeric(&left, &right, span, i64::checked_mul, |a, b| a * b),
        Div | Mod if number(&right, span)? == 0.0 => Err(runtime_error("division by zero", span)),
        // Int / Int stays an Int only when it divides exactly.
        Div => match (&*left.0, &*right.0) {
            (ValueKind::Int(a), ValueKind::Int(b)) if a.checked_rem(*b).is_some_and(|r| r != 0) => {
                Ok(Value::float(*a as f64 / *b as f64))
            }
            _ => numeric(&left, &right, span, i64::checked_div, |a, b| a / b),
        },
        Mod => numeric(&left, &right, span, i64::checked_rem, |a, b| a % b),
        Equal => Ok(Value::bool(left.equals(&right))),
        NotEqual => Ok(Value::bool(!left.equals(&right))),
        Less => comparison(&left, &right, span, |a, b| a < b),
        LessEqual => comparison(&left, &right, span, |a, b| a <= b),
        Greater => comparison(&left, &right, span, |a, b| a > b),
        GreaterEqual => comparison(&left, &right, span, |a, b| a >= b),
        And => Ok(Value::bool(left.is_truthy() && right.is_truthy())),
        Or => Ok(Value::bool(left.is_truthy() || right.is_truthy())),
    }
}

fn unary(op: UnaryOp, value: Value, span: SourceSpan) -> Result<Value> {
    match op {
        UnaryOp::Negate => match &*value.0 {
            ValueKind::Int(n) => n
                .checked_neg()
                .map(Value::int)
                .ok_or_else(|| runtime_error("integer overflow", span)),
            ValueKind::Float(n) => Ok(Value::float(-n)),
            _ => Err(runtime_error("unary `-` expects numeric value", span)),
        },
        UnaryOp::Not => Ok(Value::bool(!value.is_truthy())),
    }
}

/// Int with Int stays exact and fails on overflow; anything involving a
/// Float goes through `f64`.
fn numeric(
    left: &Value,
    right: &Value,
    span: SourceSpan,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value> {
    if let (ValueKind::Int(a), ValueKind::Int(b)) = (&*left.0, &*right.0) {
        return int_op(*a, *b)
            .map(Value::int)
            .ok_or_else(|| runtime_error("integer overflow", span));
    }
    Ok(Value::float(float_op(
        number(left, span)?,
        number(right, span)?,
    )))
}

fn comparison(
    left: &Value,
    right: &Value,
    span: SourceSpan,
    cmp: fn(f64, f64) -> bool,
) -> Result<Value> {
    if let (ValueKind::String(a), ValueKind::String(b)) = (&*left.0, &*right.0) {
        let ordering = a.cmp(b);
        return Ok(Value::bool(cmp(ordering as i8 as f64, 0.0)));
    }
    Ok(Value::bool(cmp(number(left, span)?, number(right, span)?)))
}

fn number(value: &Value, span: SourceSpan) -> Result<f64> {
    match &*value.0 {
        ValueKind::Int(n) => Ok(*n as f64),
        ValueKind::Float(n) => Ok(*n),
        _ => Err(runtime_error(
            format!("expected numeric value, found {}", value.type_name()),
            span,
        )),
    }
}

fn array_slot(index: &Value, len: usize, span: SourceSpan) -> Result<usize> {
    let Some(idx) = index.as_int() else {
        return Err(runtime_error("array index must be Int", span));
    };
    usize::try_from(idx)
        .ok()
        .filter(|idx| *idx < len)
        .ok_or_else(|| runtime_error(format!("index {idx} out of bounds"), span))
}

fn index_into(target: Value, index: Value, span: SourceSpan) -> Result<Value> {
    match (&*target.0, &*index.0) {
        (ValueKind::Array(values), ValueKind::Int(_)) => {
            let idx = array_slot(&index, values.len(), span)?;
            Ok(values[idx].clone())
        }
        (ValueKind::String(text), ValueKind::Int(idx)) => usize::try_from(*idx)
            .ok()
            .and_then(|idx| text.chars().nth(idx))
            .map(|ch| Value::string(ch.to_string()))
            .ok_or_else(|| runtime_error(format!("index {idx} out of bounds"), span)),
        (ValueKind::Map(_) | ValueKind::Record(_) | ValueKind::Module(_), ValueKind::String(key)) => {
            field_of(target.clone(), key, span)
        }
        _ => Err(runtime_error(
            format!(
                "cannot index {} with {}",
                target.type_name(),
                index.type_name()
            ),
            span,
        )),
    }
}

fn field_of(target: Value, field: &str, span: SourceSpan) -> Result<Value> {
    match &*target.0 {
        ValueKind::Map(map) => map
            .get(field)
            .cloned()
            .ok_or_else(|| runtime_error(format!("missing field `{field}`"), span)),
        ValueKind::Module(module) => module.exports.get(field).cloned().ok_or_else(|| {
            runtime_error(
                format!("module `{}` has no export `{field}`", module.name),
                span,
            )
        }),
        ValueKind::Record(record) => record
            .get(field)
            .map(|value| value.unwrap_or_else(Value::unit))
            .map_err(|err| attach_span(err, span)),
        _ => Err(runtime_error(
            format!("field access expects Map, Module or Record, found {}", target.type_name()),
            span,
        )),
    }
}

fn runtime_error(message: impl Into<String>, span: SourceSpan) -> BouquetError {
    Diagnostic::runtime(message).with_span(span).into()
}

/// Gives span-less evaluation failures the location of the call that
/// raised them. Other error kinds pass through untouched.
fn attach_span(err: BouquetError, span: SourceSpan) -> BouquetError {
    match err {
        BouquetError::Eval(diag) if diag.span.is_none() => diag.with_span(span).into(),
        other => other,
    }
}
