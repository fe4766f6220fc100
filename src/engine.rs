// ABOUTME: The execution machine that walks the directive tree and renders output.
//! The execution machine: walks a directive [`Instruction`] tree, evaluating
//! expressions, expanding macros, following includes, and accumulating the
//! rendered output.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::io::IsTerminal;
use std::rc::Rc;

use crate::cache::{Cache, InMemoryCache, SqliteCache};
use crate::config::BuilderConfig;
use crate::context::{Context, GlobalContext};
use crate::directive::{Conditional, DirectiveParser, Instruction, LoopKind};
use crate::error::{BuilderError, ExprError};
use crate::expr::{self, MacroInvoker};
use crate::macros::{MacroDef, MacroRegistry};
use crate::readers::github::GithubReader;
use crate::readers::http::HttpReader;
use crate::readers::local::LocalReader;
use crate::readers::ReaderRegistry;
use crate::value::{FunctionValue, Value};

/// Default maximum nesting depth of recursive instruction-list execution —
/// conditionals, loop bodies, macro expansion and includes all re-enter the
/// guarded frame, so this catches runaway recursion without bounding the
/// iteration count of a straightforward `@while`/`@repeat` loop.
pub const MAX_EXECUTION_DEPTH: usize = 256;

pub struct Builder {
    config: BuilderConfig,
    readers: ReaderRegistry,
    cache: Box<dyn Cache>,
    global: Rc<GlobalContext>,
    macros: MacroRegistry,
    included: HashSet<String>,
    depth: Cell<usize>,
    last_emitted_file: RefCell<Option<String>>,
    buffer: RefCell<Vec<String>>,
}

impl Builder {
    pub fn new(config: BuilderConfig) -> Result<Self, BuilderError> {
        let mut readers = ReaderRegistry::new();
        readers.register(Box::new(LocalReader::new(&config.search_roots).map_err(|e| {
            BuilderError::SourceInclusion {
                file: String::new(),
                line: 0,
                message: e.to_string(),
            }
        })?));
        readers.register(Box::new(HttpReader::new(config.net.clone(), config.request_timeout)));
        readers.register(Box::new(GithubReader::new(config.net.clone(), config.request_timeout)));

        let cache: Box<dyn Cache> = match &config.cache_db_path {
            Some(path) => Box::new(SqliteCache::open(path).map_err(|e| BuilderError::SourceInclusion {
                file: String::new(),
                line: 0,
                message: e.to_string(),
            })?),
            None => Box::new(InMemoryCache::new()),
        };

        Ok(Builder {
            config,
            readers,
            cache,
            global: Rc::new(GlobalContext::new()),
            macros: MacroRegistry::new(),
            included: HashSet::new(),
            depth: Cell::new(0),
            last_emitted_file: RefCell::new(None),
            buffer: RefCell::new(Vec::new()),
        })
    }

    /// Renders `source` (named `file` for diagnostics) with `caller_context`
    /// layered in as the highest-precedence bindings.
    pub fn execute(
        &mut self,
        file: &str,
        source: &str,
        caller_context: HashMap<String, Value>,
    ) -> Result<String, BuilderError> {
        self.global.reset();
        self.macros.clear();
        self.included.clear();
        self.depth.set(0);
        *self.last_emitted_file.borrow_mut() = None;
        *self.buffer.borrow_mut() = Vec::new();

        let mut base_bindings = HashMap::new();
        base_bindings.insert("__FILE__".to_string(), Value::String(file.to_string()));
        base_bindings.insert("__PATH__".to_string(), Value::String(String::new()));
        let base = Context::overlay(&Context::root(), base_bindings);
        let base = Context::overlay(&base, caller_context);

        let parser = DirectiveParser::new(file);
        let instructions = parser.parse(source)?;
        self.execute_instructions(&parser, &instructions, &base, false)?;
        Ok(self.buffer.borrow().concat())
    }

    fn execute_instructions(
        &mut self,
        parser: &DirectiveParser,
        instructions: &[Instruction],
        ctx: &Rc<Context>,
        inline: bool,
    ) -> Result<(), BuilderError> {
        let depth = self.depth.get() + 1;
        if depth > self.config.max_execution_depth {
            let (file, line) = self.current_location(ctx);
            return Err(BuilderError::MaxExecutionDepthReached {
                file,
                line,
                limit: self.config.max_execution_depth,
            });
        }
        self.depth.set(depth);
        let result = self.run_list(parser, instructions, ctx, inline);
        self.depth.set(depth - 1);
        result
    }

    fn run_list(
        &mut self,
        parser: &DirectiveParser,
        instructions: &[Instruction],
        ctx: &Rc<Context>,
        inline: bool,
    ) -> Result<(), BuilderError> {
        for instr in instructions {
            self.dispatch(parser, instr, ctx, inline)?;
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        parser: &DirectiveParser,
        instr: &Instruction,
        ctx: &Rc<Context>,
        inline: bool,
    ) -> Result<(), BuilderError> {
        let mut line_binding = HashMap::new();
        line_binding.insert("__LINE__".to_string(), Value::Number(instr.line() as f64));
        let ctx = Context::overlay(ctx, line_binding);

        match instr {
            Instruction::Set { variable, value, line } => {
                let v = self.eval_in(value, &ctx).map_err(|e| self.wrap_expr_error(&ctx, *line, e))?;
                self.global.set(variable.clone(), v);
                Ok(())
            }
            Instruction::Output { value, computed, line } => {
                if *computed {
                    self.emit(&ctx, value, inline);
                } else {
                    let v = self.eval_in(value, &ctx).map_err(|e| self.wrap_expr_error(&ctx, *line, e))?;
                    self.emit(&ctx, &v.to_string(), inline);
                }
                Ok(())
            }
            Instruction::Include { value, once, line } => {
                self.handle_include(parser, &ctx, value, *once, *line, inline)
            }
            Instruction::Conditional(cond) => self.handle_conditional(parser, cond, &ctx, inline).map(|_| ()),
            Instruction::Loop { kind, condition, body, line } => {
                self.handle_loop(parser, *kind, condition, body, &ctx, *line, inline)
            }
            Instruction::Macro { declaration, body, line } => {
                self.handle_macro_decl(declaration, body, &ctx, *line)
            }
            Instruction::Error { value, line } => {
                let v = self.eval_in(value, &ctx).map_err(|e| self.wrap_expr_error(&ctx, *line, e))?;
                let (file, _) = self.current_location(&ctx);
                Err(BuilderError::UserDefined {
                    file,
                    line: *line,
                    message: v.to_string(),
                })
            }
            Instruction::Warning { value, line } => {
                let v = self.eval_in(value, &ctx).map_err(|e| self.wrap_expr_error(&ctx, *line, e))?;
                self.emit_warning(&v.to_string());
                Ok(())
            }
        }
    }

    fn eval_in(&mut self, source: &str, ctx: &Rc<Context>) -> Result<Value, ExprError> {
        let global = Rc::clone(&self.global);
        expr::evaluate_with(source, ctx, &global, self)
    }

    fn handle_conditional(
        &mut self,
        parser: &DirectiveParser,
        cond: &Conditional,
        ctx: &Rc<Context>,
        inline: bool,
    ) -> Result<bool, BuilderError> {
        let test = self
            .eval_in(&cond.test, ctx)
            .map_err(|e| self.wrap_expr_error(ctx, cond.line, e))?;
        let truthy = test.is_truthy();
        if truthy {
            self.execute_instructions(parser, &cond.consequent, ctx, inline)?;
            return Ok(true);
        }
        for branch in &cond.elseifs {
            if self.handle_conditional(parser, branch, ctx, inline)? {
                return Ok(true);
            }
        }
        if let Some(alternate) = &cond.alternate {
            self.execute_instructions(parser, alternate, ctx, inline)?;
        }
        Ok(truthy)
    }

    fn handle_loop(
        &mut self,
        parser: &DirectiveParser,
        kind: LoopKind,
        condition: &str,
        body: &[Instruction],
        ctx: &Rc<Context>,
        line: usize,
        inline: bool,
    ) -> Result<(), BuilderError> {
        let mut index: i64 = 0;
        loop {
            let test = self
                .eval_in(condition, ctx)
                .map_err(|e| self.wrap_expr_error(ctx, line, e))?;
            let keep_going = match kind {
                LoopKind::While => test.is_truthy(),
                LoopKind::Repeat => {
                    let target = match test {
                        Value::Number(n) => n as i64,
                        _ => 0,
                    };
                    index < target
                }
            };
            if !keep_going {
                break;
            }

            let mut loop_fields = HashMap::new();
            loop_fields.insert("index".to_string(), Value::Number(index as f64));
            loop_fields.insert("iteration".to_string(), Value::Number((index + 1) as f64));
            let mut bindings = HashMap::new();
            bindings.insert("loop".to_string(), Value::Object(loop_fields));
            let loop_ctx = Context::overlay(ctx, bindings);

            self.execute_instructions(parser, body, &loop_ctx, inline)?;
            index += 1;
        }
        Ok(())
    }

    fn handle_macro_decl(
        &mut self,
        declaration: &str,
        body: &[Instruction],
        ctx: &Rc<Context>,
        line: usize,
    ) -> Result<(), BuilderError> {
        let (name, params) = expr::parse_macro_declaration(declaration).map_err(|e| {
            let (file, _) = self.current_location(ctx);
            BuilderError::Parse {
                file,
                line,
                message: e.to_string(),
            }
        })?;
        let (origin_file, origin_path) = self.ctx_file_path(ctx);
        let def = MacroDef {
            name: name.clone(),
            parameter_names: params,
            body: body.to_vec(),
            origin_file: origin_file.clone(),
            origin_path,
            origin_line: line,
        };
        match self.macros.define(def) {
            Ok(()) => {
                self.global
                    .set(name.clone(), Value::Function(FunctionValue::Macro(Rc::from(name.as_str()))));
                Ok(())
            }
            Err((existing_file, existing_line)) => Err(BuilderError::MacroIsAlreadyDeclared {
                name,
                origin_file: existing_file,
                origin_line: existing_line,
                file: origin_file,
                line,
            }),
        }
    }

    fn handle_include(
        &mut self,
        _parser: &DirectiveParser,
        ctx: &Rc<Context>,
        value: &str,
        once: bool,
        line: usize,
        inline: bool,
    ) -> Result<(), BuilderError> {
        let known_names: HashSet<String> = self.macros.names().collect();
        let is_known = move |name: &str| known_names.contains(name);
        let global = Rc::clone(&self.global);

        let macro_call = expr::try_parse_macro_call(value, is_known, ctx, &global, self)
            .map_err(|e| self.wrap_expr_error(ctx, line, e))?;

        if let Some((name, args)) = macro_call {
            let def = self
                .macros
                .get(&name)
                .cloned()
                .expect("macro name came from the registry's own name list");
            let expanded = self.run_macro_body(&def, args, true)?;
            if let Value::String(s) = expanded {
                self.emit(ctx, &s, inline);
            }
            return Ok(());
        }

        let reference_value = self.eval_in(value, ctx).map_err(|e| self.wrap_expr_error(ctx, line, e))?;
        let reference = reference_value.to_string().trim().to_string();

        if once && self.included.contains(&reference) {
            return Ok(());
        }

        let content = match self.cache.get(&reference) {
            Ok(Some(cached)) => cached,
            _ => {
                let reader = self.readers.get(&reference).map_err(|e| self.reader_err(ctx, line, e.to_string()))?;
                let fetched = reader.read(&reference).map_err(|e| self.reader_err(ctx, line, e.to_string()))?;
                let _ = self.cache.put(&reference, &fetched);
                fetched
            }
        };

        let parsed_path = {
            let reader = self.readers.get(&reference).map_err(|e| self.reader_err(ctx, line, e.to_string()))?;
            reader.parse_path(&reference)
        };

        self.included.insert(reference);

        let mut bindings = HashMap::new();
        bindings.insert("__FILE__".to_string(), Value::String(parsed_path.file.clone()));
        bindings.insert("__PATH__".to_string(), Value::String(parsed_path.path));
        let nested_ctx = Context::overlay(ctx, bindings);

        let nested_parser = DirectiveParser::new(parsed_path.file);
        let instructions = nested_parser
            .parse(&content)
            .map_err(|e| self.reader_err(ctx, line, e.to_string()))?;
        self.execute_instructions(&nested_parser, &instructions, &nested_ctx, inline)
    }

    fn expand_include_inline(&mut self, reference: &Value) -> Result<Value, BuilderError> {
        let reference = reference.to_string().trim().to_string();
        let content = match self.cache.get(&reference) {
            Ok(Some(cached)) => cached,
            _ => {
                let reader = self
                    .readers
                    .get(&reference)
                    .map_err(|e| self.plain_err(e.to_string()))?;
                let fetched = reader.read(&reference).map_err(|e| self.plain_err(e.to_string()))?;
                let _ = self.cache.put(&reference, &fetched);
                fetched
            }
        };
        let parsed_path = {
            let reader = self
                .readers
                .get(&reference)
                .map_err(|e| self.plain_err(e.to_string()))?;
            reader.parse_path(&reference)
        };

        let mut bindings = HashMap::new();
        bindings.insert("__FILE__".to_string(), Value::String(parsed_path.file.clone()));
        bindings.insert("__PATH__".to_string(), Value::String(parsed_path.path));
        let nested_ctx = Context::overlay(&Context::root(), bindings);
        let nested_parser = DirectiveParser::new(parsed_path.file);
        let instructions = nested_parser.parse(&content)?;

        let saved = std::mem::take(&mut *self.buffer.borrow_mut());
        let result = self.execute_instructions(&nested_parser, &instructions, &nested_ctx, true);
        let expanded = self.buffer.borrow().concat();
        *self.buffer.borrow_mut() = saved;
        result?;
        Ok(Value::String(expanded))
    }

    fn expand_macro_inline(&mut self, name: &str, args: Vec<Value>) -> Result<Value, BuilderError> {
        let def = self
            .macros
            .get(name)
            .cloned()
            .ok_or_else(|| self.plain_err(format!("macro \"{name}\" is not declared")))?;
        self.run_macro_body(&def, args, true)
    }

    fn run_macro_body(&mut self, def: &MacroDef, args: Vec<Value>, inline: bool) -> Result<Value, BuilderError> {
        let mut bindings = HashMap::new();
        for (i, param) in def.parameter_names.iter().enumerate() {
            bindings.insert(param.clone(), args.get(i).cloned().unwrap_or(Value::Null));
        }
        bindings.insert("__FILE__".to_string(), Value::String(def.origin_file.clone()));
        bindings.insert("__PATH__".to_string(), Value::String(def.origin_path.clone()));
        bindings.insert("__INLINE__".to_string(), Value::Bool(inline));
        let macro_ctx = Context::overlay(&Context::root(), bindings);

        let saved = std::mem::take(&mut *self.buffer.borrow_mut());
        let parser = DirectiveParser::new(def.origin_file.clone());
        let result = self.execute_instructions(&parser, &def.body, &macro_ctx, inline);
        let expanded = self.buffer.borrow().concat();
        *self.buffer.borrow_mut() = saved;
        result?;

        let trimmed = expanded.strip_suffix('\n').unwrap_or(&expanded).to_string();
        Ok(Value::String(trimmed))
    }

    fn emit(&self, ctx: &Rc<Context>, chunk: &str, inline: bool) {
        if self.config.generate_line_control_statements && !inline {
            let (file, _) = self.current_location(ctx);
            let mut last = self.last_emitted_file.borrow_mut();
            if last.as_deref() != Some(file.as_str()) {
                let path = self.ctx_string(ctx, "__PATH__");
                let full = if path.is_empty() { file.clone() } else { format!("{path}/{file}") };
                let line_no = self.ctx_number(ctx, "__LINE__") as i64;
                let escaped = full.replace('"', "\\\"");
                self.buffer.borrow_mut().push(format!("#line {line_no} \"{escaped}\"\n"));
                *last = Some(file);
            }
        }
        self.buffer.borrow_mut().push(chunk.to_string());
    }

    fn emit_warning(&self, message: &str) {
        if std::io::stderr().is_terminal() {
            log::warn!("\x1b[33m{message}\x1b[0m");
        } else {
            log::warn!("{message}");
        }
    }

    fn wrap_expr_error(&self, ctx: &Rc<Context>, line: usize, e: ExprError) -> BuilderError {
        let (file, _) = self.current_location(ctx);
        BuilderError::ExpressionEvaluation { file, line, source: e }
    }

    fn reader_err(&self, ctx: &Rc<Context>, line: usize, message: String) -> BuilderError {
        let (file, _) = self.current_location(ctx);
        BuilderError::SourceInclusion { file, line, message }
    }

    fn plain_err(&self, message: String) -> BuilderError {
        BuilderError::SourceInclusion {
            file: String::new(),
            line: 0,
            message,
        }
    }

    fn ctx_string(&self, ctx: &Rc<Context>, key: &str) -> String {
        match ctx.get(key) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        }
    }

    fn ctx_number(&self, ctx: &Rc<Context>, key: &str) -> f64 {
        match ctx.get(key) {
            Some(Value::Number(n)) => n,
            _ => 0.0,
        }
    }

    fn ctx_file_path(&self, ctx: &Rc<Context>) -> (String, String) {
        (self.ctx_string(ctx, "__FILE__"), self.ctx_string(ctx, "__PATH__"))
    }

    fn current_location(&self, ctx: &Rc<Context>) -> (String, usize) {
        (self.ctx_string(ctx, "__FILE__"), self.ctx_number(ctx, "__LINE__") as usize)
    }
}

impl MacroInvoker for Builder {
    fn invoke_macro(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
        self.expand_macro_inline(name, args)
            .map_err(|e| ExprError::MacroExpansion(e.to_string()))
    }

    fn invoke_include(&mut self, reference: &Value) -> Result<Value, ExprError> {
        self.expand_include_inline(reference)
            .map_err(|e| ExprError::MacroExpansion(e.to_string()))
    }
}
