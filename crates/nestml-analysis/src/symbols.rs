//! Symbol table construction and name resolution.
//!
//! The table is built in two passes over each neuron:
//!
//! 1. **Install**: every declaration (state, initial values, parameters,
//!    internals, shapes, aliases, input ports, functions) is entered into
//!    the neuron's scope, with its datatype resolved.
//! 2. **Resolve**: every variable reference in initializers, equations,
//!    and statement bodies is pointed at exactly one symbol, or a
//!    diagnostic explains why not.
//!
//! The two-pass design is what allows forward references inside
//! `parameters` and `initial_values`; the resolve pass enforces
//! declaration order for the blocks that forbid them.
//!
//! Unit symbols (`ms`, `mV`, ...) are an open set: a reference that does
//! not resolve in any scope falls back to the unit table and materializes
//! a `UNIT` symbol in the global scope, which is how `0.3 / ms` types as
//! `1/ms` through ordinary expression typing.

use crate::builtins;
use indexmap::IndexMap;
use nestml_ast::unit::{resolve_unit_expr, resolve_unit_name};
use nestml_ast::{
    BlockKind, CompilationUnit, DataTypeExpr, Declaration, Diagnostic, DiagnosticKind, Diagnostics,
    Equation, Expr, ExprKind, Neuron, PhysicalType, ScopeId, Span, Stmt, SymbolId,
};

/// What a name denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// State, initial value, parameter, internal, or local variable
    Variable,
    /// User-defined function or `function`-tagged alias
    Function,
    /// `shape` definition in an equations block
    Shape,
    /// Input port; `spike` records the port kind for convolve checking
    InputPort { spike: bool },
    /// Top-level neuron
    Neuron,
    /// Built-in physical unit symbol
    Unit,
}

/// A named entity with everything later phases need to know about it.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: PhysicalType,
    /// Declaring block, for variables
    pub block: Option<BlockKind>,
    /// Parameter types, for functions
    pub params: Vec<PhysicalType>,
    pub span: Span,
    pub recordable: bool,
    /// `function` alias: recomputed on reference, never stored
    pub is_alias: bool,
    /// Built-in symbol (predefined `t`, `e`, unit symbols)
    pub predefined: bool,
    /// Position within the declaring block, for forward-reference checks
    pub decl_index: u32,
    /// Set once anything refers to this symbol
    pub referenced: bool,
}

impl Symbol {
    fn new(name: impl Into<String>, kind: SymbolKind, ty: PhysicalType, span: Span) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            block: None,
            params: Vec::new(),
            span,
            recordable: false,
            is_alias: false,
            predefined: false,
            decl_index: 0,
            referenced: false,
        }
    }
}

/// One scope: a name→symbol map plus a parent link.
#[derive(Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    names: IndexMap<String, SymbolId>,
}

/// Per-unit symbol table: a scope arena plus a symbol arena.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// Create a table whose global scope holds the predefined symbols:
    /// the simulation time `t` (ms) and Euler's number `e`.
    pub fn new() -> Self {
        let mut table = Self {
            scopes: vec![Scope::default()],
            symbols: Vec::new(),
        };

        let ms = resolve_unit_name("ms").expect("ms is a known unit");
        for (name, ty) in [
            ("t", PhysicalType::real(ms)),
            ("e", PhysicalType::REAL),
        ] {
            let mut symbol = Symbol::new(name, SymbolKind::Variable, ty, Span::zero(0));
            symbol.predefined = true;
            let _ = table.install(ScopeId(0), symbol);
        }

        table
    }

    /// The global scope.
    pub fn global_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Create a child scope.
    pub fn push_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(parent),
            names: IndexMap::new(),
        });
        id
    }

    /// Install a symbol. Returns the existing symbol on a duplicate name
    /// in the same scope.
    pub fn install(&mut self, scope: ScopeId, symbol: Symbol) -> Result<SymbolId, SymbolId> {
        if let Some(&existing) = self.scopes[scope.0 as usize].names.get(&symbol.name) {
            return Err(existing);
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.scopes[scope.0 as usize]
            .names
            .insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        Ok(id)
    }

    /// Look a name up, walking enclosing scopes.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = &self.scopes[id.0 as usize];
            if let Some(&symbol) = scope.names.get(name) {
                return Some(symbol);
            }
            current = scope.parent;
        }
        None
    }

    /// Look a name up in one scope only.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scopes[scope.0 as usize].names.get(name).copied()
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    /// All symbols, in installation order.
    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    /// Resolve a name, falling back to the unit table. A unit hit
    /// materializes a `UNIT` symbol in the global scope.
    pub fn resolve_or_unit(&mut self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        if let Some(id) = self.lookup(scope, name) {
            return Some(id);
        }
        let unit = resolve_unit_name(name)?;
        let mut symbol = Symbol::new(
            name,
            SymbolKind::Unit,
            PhysicalType::real(unit),
            Span::zero(0),
        );
        symbol.predefined = true;
        match self.install(self.global_scope(), symbol) {
            Ok(id) => Some(id),
            Err(existing) => Some(existing),
        }
    }

    /// True if declaring `name` would collide with a reserved name: a
    /// unit symbol or a built-in function.
    pub fn is_reserved(name: &str) -> bool {
        resolve_unit_name(name).is_some() || builtins::is_builtin(name)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the symbol table for a compilation unit and resolve every
/// variable reference in it.
pub fn build_symbol_table(unit: &mut CompilationUnit, diags: &mut Diagnostics) -> SymbolTable {
    let mut table = SymbolTable::new();

    // Pass 1: install all neuron-level declarations.
    for neuron in &mut unit.neurons {
        install_neuron(&mut table, neuron, diags);
    }

    // Pass 2: resolve references.
    for neuron in &mut unit.neurons {
        let mut resolver = Resolver {
            table: &mut table,
            diags: &mut *diags,
            neuron_name: neuron.name.clone(),
        };
        resolver.resolve_neuron(neuron);
    }

    // Unused-symbol warnings for parameters and internals.
    for (_, symbol) in table.symbols() {
        if symbol.referenced || symbol.predefined {
            continue;
        }
        if matches!(
            symbol.block,
            Some(BlockKind::Parameters) | Some(BlockKind::Internals)
        ) {
            diags.push(Diagnostic::warning(
                DiagnosticKind::UnusedSymbol,
                symbol.span,
                format!("'{}' is declared but never used", symbol.name),
            ));
        }
    }

    table
}

/// Resolve a declaration's datatype, reporting unknown units.
fn resolve_datatype(
    datatype: &DataTypeExpr,
    span: Span,
    neuron: &str,
    diags: &mut Diagnostics,
) -> PhysicalType {
    match datatype {
        DataTypeExpr::Real => PhysicalType::REAL,
        DataTypeExpr::Integer => PhysicalType::INTEGER,
        DataTypeExpr::Boolean => PhysicalType::BOOLEAN,
        DataTypeExpr::String => PhysicalType::STRING,
        DataTypeExpr::Void => PhysicalType::VOID,
        DataTypeExpr::Unit(expr) => match resolve_unit_expr(expr) {
            Ok(unit) => PhysicalType::real(unit),
            Err(message) => {
                diags.push(
                    Diagnostic::error(DiagnosticKind::InvalidUnit, span, message)
                        .in_neuron(neuron),
                );
                PhysicalType::ERROR
            }
        },
    }
}

fn install_neuron(table: &mut SymbolTable, neuron: &mut Neuron, diags: &mut Diagnostics) {
    let global = table.global_scope();

    let neuron_symbol = Symbol::new(
        neuron.name.clone(),
        SymbolKind::Neuron,
        PhysicalType::VOID,
        neuron.span,
    );
    if let Err(existing) = table.install(global, neuron_symbol) {
        let first_span = table.symbol(existing).span;
        diags.push(
            Diagnostic::error(
                DiagnosticKind::DuplicateSymbol,
                neuron.span,
                format!("neuron '{}' is declared more than once", neuron.name),
            )
            .with_label(first_span, "first declared here"),
        );
    }

    let scope = table.push_scope(global);
    neuron.scope = Some(scope);

    // Declaration blocks
    let mut block_counters: IndexMap<BlockKind, u32> = IndexMap::new();
    let neuron_name = neuron.name.clone();

    let mut install_decl =
        |table: &mut SymbolTable, decl: &mut Declaration, kind: BlockKind, diags: &mut Diagnostics| {
            let ty = resolve_datatype(&decl.datatype, decl.span, &neuron_name, diags);
            decl.ty = Some(ty);

            for name in &decl.names {
                if SymbolTable::is_reserved(name) {
                    diags.push(
                        Diagnostic::error(
                            DiagnosticKind::ReservedName,
                            decl.span,
                            format!("'{}' is a reserved name and cannot be redeclared", name),
                        )
                        .in_neuron(&neuron_name),
                    );
                    continue;
                }

                let index = block_counters.entry(kind).or_insert(0);
                let mut symbol = Symbol::new(
                    name.clone(),
                    if decl.is_alias {
                        SymbolKind::Function
                    } else {
                        SymbolKind::Variable
                    },
                    ty,
                    decl.span,
                );
                symbol.block = Some(kind);
                symbol.recordable = decl.recordable;
                symbol.is_alias = decl.is_alias;
                symbol.decl_index = *index;
                *index += 1;

                if let Err(existing) = table.install(scope, symbol) {
                    let first_span = table.symbol(existing).span;
                    diags.push(
                        Diagnostic::error(
                            DiagnosticKind::DuplicateSymbol,
                            decl.span,
                            format!("'{}' is declared more than once", name),
                        )
                        .with_label(first_span, "first declared here")
                        .in_neuron(&neuron_name),
                    );
                }
            }
        };

    for block in &mut neuron.state_blocks {
        for decl in &mut block.declarations {
            install_decl(table, decl, BlockKind::State, diags);
        }
    }
    for block in &mut neuron.initial_blocks {
        for decl in &mut block.declarations {
            install_decl(table, decl, BlockKind::InitialValues, diags);
        }
    }
    for block in &mut neuron.parameter_blocks {
        for decl in &mut block.declarations {
            install_decl(table, decl, BlockKind::Parameters, diags);
        }
    }
    for block in &mut neuron.internal_blocks {
        for decl in &mut block.declarations {
            install_decl(table, decl, BlockKind::Internals, diags);
        }
    }

    // Equations: order-0 shapes and aliases introduce names.
    for block in &mut neuron.equations_blocks {
        for equation in &mut block.equations {
            match equation {
                Equation::Shape(shape) if shape.order == 0 => {
                    let symbol = Symbol::new(
                        shape.name.clone(),
                        SymbolKind::Shape,
                        PhysicalType::REAL,
                        shape.span,
                    );
                    if let Err(existing) = table.install(scope, symbol) {
                        let first_span = table.symbol(existing).span;
                        diags.push(
                            Diagnostic::error(
                                DiagnosticKind::DuplicateSymbol,
                                shape.span,
                                format!("shape '{}' is declared more than once", shape.name),
                            )
                            .with_label(first_span, "first declared here")
                            .in_neuron(&neuron.name),
                        );
                    }
                }
                Equation::Shape(_) => {
                    // ODE-defined shapes carry their state in
                    // initial_values; the context conditions check that
                    // those declarations exist.
                }
                Equation::Alias(decl) => {
                    install_decl(table, decl, BlockKind::InitialValues, diags);
                }
                _ => {}
            }
        }
    }

    // Input ports
    for port in neuron.input_blocks.iter_mut().flat_map(|b| b.ports.iter_mut()) {
        let ty = match &port.datatype {
            Some(dt) => resolve_datatype(dt, port.span, &neuron.name, diags),
            // Unit-less spike ports default to a dimensionless weight;
            // the convolve result then takes the shape's unit alone.
            None => PhysicalType::REAL,
        };
        port.ty = Some(ty);

        let mut symbol = Symbol::new(
            port.name.clone(),
            SymbolKind::InputPort {
                spike: port.kind.is_spike(),
            },
            ty,
            port.span,
        );
        symbol.recordable = false;
        if let Err(existing) = table.install(scope, symbol) {
            let first_span = table.symbol(existing).span;
            diags.push(
                Diagnostic::error(
                    DiagnosticKind::DuplicateSymbol,
                    port.span,
                    format!("input port '{}' is declared more than once", port.name),
                )
                .with_label(first_span, "first declared here")
                .in_neuron(&neuron.name),
            );
        }
    }

    // User functions
    for func in &neuron.functions {
        if SymbolTable::is_reserved(&func.name) {
            diags.push(
                Diagnostic::error(
                    DiagnosticKind::ReservedName,
                    func.span,
                    format!("'{}' is a reserved name and cannot be redeclared", func.name),
                )
                .in_neuron(&neuron.name),
            );
            continue;
        }

        let params: Vec<PhysicalType> = func
            .params
            .iter()
            .map(|(_, dt)| resolve_datatype(dt, func.span, &neuron.name, diags))
            .collect();
        let return_ty = func
            .return_type
            .as_ref()
            .map(|dt| resolve_datatype(dt, func.span, &neuron.name, diags))
            .unwrap_or(PhysicalType::VOID);

        let mut symbol = Symbol::new(func.name.clone(), SymbolKind::Function, return_ty, func.span);
        symbol.params = params;
        if let Err(existing) = table.install(scope, symbol) {
            let first_span = table.symbol(existing).span;
            diags.push(
                Diagnostic::error(
                    DiagnosticKind::DuplicateSymbol,
                    func.span,
                    format!("function '{}' is declared more than once", func.name),
                )
                .with_label(first_span, "first declared here")
                .in_neuron(&neuron.name),
            );
        }
    }
}

/// Pass 2: attach a symbol to every variable reference.
struct Resolver<'a> {
    table: &'a mut SymbolTable,
    diags: &'a mut Diagnostics,
    neuron_name: String,
}

/// Where an expression sits, for forward-reference enforcement.
#[derive(Clone, Copy)]
struct RefContext {
    block: Option<BlockKind>,
    decl_index: u32,
}

impl RefContext {
    const FREE: RefContext = RefContext {
        block: None,
        decl_index: u32::MAX,
    };
}

impl Resolver<'_> {
    fn resolve_neuron(&mut self, neuron: &mut Neuron) {
        let scope = neuron.scope.expect("scope installed in pass 1");

        for (kind, decl) in neuron
            .state_blocks
            .iter_mut()
            .map(|b| (BlockKind::State, b))
            .chain(
                neuron
                    .initial_blocks
                    .iter_mut()
                    .map(|b| (BlockKind::InitialValues, b)),
            )
            .chain(
                neuron
                    .parameter_blocks
                    .iter_mut()
                    .map(|b| (BlockKind::Parameters, b)),
            )
            .chain(
                neuron
                    .internal_blocks
                    .iter_mut()
                    .map(|b| (BlockKind::Internals, b)),
            )
            .flat_map(|(kind, block)| {
                block
                    .declarations
                    .iter_mut()
                    .map(move |d| (kind, d))
            })
        {
            self.resolve_declaration(decl, scope, kind);
        }

        for block in &mut neuron.equations_blocks {
            for equation in &mut block.equations {
                match equation {
                    Equation::Shape(shape) => {
                        self.resolve_expr(&mut shape.rhs, scope, RefContext::FREE)
                    }
                    Equation::Ode(ode) => {
                        self.resolve_expr(&mut ode.rhs, scope, RefContext::FREE)
                    }
                    Equation::Alias(decl) => {
                        self.resolve_declaration(decl, scope, BlockKind::InitialValues)
                    }
                    Equation::UpdateStep { rhs, .. } => {
                        self.resolve_expr(rhs, scope, RefContext::FREE)
                    }
                }
            }
        }

        for block_index in 0..neuron.update_blocks.len() {
            let body_scope = self.table.push_scope(scope);
            let mut statements =
                std::mem::take(&mut neuron.update_blocks[block_index].statements);
            self.resolve_stmts(&mut statements, body_scope);
            neuron.update_blocks[block_index].statements = statements;
        }

        for func_index in 0..neuron.functions.len() {
            let body_scope = self.table.push_scope(scope);
            let func = &mut neuron.functions[func_index];

            for (i, (name, _)) in func.params.iter().enumerate() {
                let symbol_id = self.table.lookup(scope, &func.name);
                let ty = symbol_id
                    .map(|id| self.table.symbol(id).params.get(i).copied())
                    .flatten()
                    .unwrap_or(PhysicalType::ERROR);
                let mut symbol = Symbol::new(name.clone(), SymbolKind::Variable, ty, func.span);
                symbol.block = Some(BlockKind::Local);
                let _ = self.table.install(body_scope, symbol);
            }

            let mut body = std::mem::take(&mut func.body);
            self.resolve_stmts(&mut body, body_scope);
            neuron.functions[func_index].body = body;
        }
    }

    fn resolve_declaration(&mut self, decl: &mut Declaration, scope: ScopeId, kind: BlockKind) {
        if let Some(initializer) = &mut decl.initializer {
            // Forward-reference enforcement needs the index of the
            // declaration whose initializer we are resolving.
            let decl_index = decl
                .names
                .first()
                .and_then(|name| self.table.lookup(scope, name))
                .map(|id| self.table.symbol(id).decl_index)
                .unwrap_or(u32::MAX);

            self.resolve_expr(
                initializer,
                scope,
                RefContext {
                    block: Some(kind),
                    decl_index,
                },
            );
        }
    }

    fn resolve_stmts(&mut self, statements: &mut [Stmt], scope: ScopeId) {
        for statement in statements {
            match statement {
                Stmt::Declaration(decl) => {
                    if let Some(init) = &mut decl.initializer {
                        self.resolve_expr(init, scope, RefContext::FREE);
                    }

                    let ty = resolve_datatype(
                        &decl.datatype,
                        decl.span,
                        &self.neuron_name,
                        self.diags,
                    );
                    decl.ty = Some(ty);

                    for name in &decl.names {
                        if SymbolTable::is_reserved(name) {
                            self.diags.push(
                                Diagnostic::error(
                                    DiagnosticKind::ReservedName,
                                    decl.span,
                                    format!(
                                        "'{}' is a reserved name and cannot be redeclared",
                                        name
                                    ),
                                )
                                .in_neuron(&self.neuron_name),
                            );
                            continue;
                        }

                        // Shadowing an enclosing declaration is legal but
                        // suspicious.
                        if self.table.lookup_local(scope, name).is_none() {
                            if let Some(outer) = self.table.lookup(scope, name) {
                                let outer_span = self.table.symbol(outer).span;
                                self.diags.push(
                                    Diagnostic::warning(
                                        DiagnosticKind::ShadowedSymbol,
                                        decl.span,
                                        format!("'{}' shadows an outer declaration", name),
                                    )
                                    .with_label(outer_span, "outer declaration here"),
                                );
                            }
                        }

                        let mut symbol = Symbol::new(
                            name.clone(),
                            SymbolKind::Variable,
                            ty,
                            decl.span,
                        );
                        symbol.block = Some(BlockKind::Local);
                        if let Err(existing) = self.table.install(scope, symbol) {
                            let first_span = self.table.symbol(existing).span;
                            self.diags.push(
                                Diagnostic::error(
                                    DiagnosticKind::DuplicateSymbol,
                                    decl.span,
                                    format!("'{}' is declared more than once", name),
                                )
                                .with_label(first_span, "first declared here")
                                .in_neuron(&self.neuron_name),
                            );
                        }
                    }
                }
                Stmt::Assignment { lhs, rhs, .. } => {
                    self.resolve_expr(lhs, scope, RefContext::FREE);
                    self.resolve_expr(rhs, scope, RefContext::FREE);
                }
                Stmt::Expr(expr) => self.resolve_expr(expr, scope, RefContext::FREE),
                Stmt::Return { value, .. } => {
                    if let Some(value) = value {
                        self.resolve_expr(value, scope, RefContext::FREE);
                    }
                }
                Stmt::If(if_stmt) => {
                    for (condition, body) in &mut if_stmt.branches {
                        self.resolve_expr(condition, scope, RefContext::FREE);
                        let inner = self.table.push_scope(scope);
                        self.resolve_stmts(body, inner);
                    }
                    if let Some(body) = &mut if_stmt.else_branch {
                        let inner = self.table.push_scope(scope);
                        self.resolve_stmts(body, inner);
                    }
                }
                Stmt::For(for_stmt) => {
                    self.resolve_expr(&mut for_stmt.from, scope, RefContext::FREE);
                    self.resolve_expr(&mut for_stmt.to, scope, RefContext::FREE);
                    if let Some(step) = &mut for_stmt.step {
                        self.resolve_expr(step, scope, RefContext::FREE);
                    }

                    let inner = self.table.push_scope(scope);
                    let mut loop_var = Symbol::new(
                        for_stmt.variable.clone(),
                        SymbolKind::Variable,
                        PhysicalType::INTEGER,
                        for_stmt.span,
                    );
                    loop_var.block = Some(BlockKind::Local);
                    let _ = self.table.install(inner, loop_var);
                    self.resolve_stmts(&mut for_stmt.body, inner);
                }
            }
        }
    }

    fn resolve_expr(&mut self, expr: &mut Expr, scope: ScopeId, ctx: RefContext) {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Variable {
                name,
                order,
                symbol,
            } => {
                let raw = if *order > 0 {
                    format!("{}{}", name, "'".repeat(*order as usize))
                } else {
                    name.clone()
                };

                // A primed reference prefers its directly declared symbol
                // (`g_ex'` in initial_values), then falls back to the
                // base variable.
                let resolved = self
                    .table
                    .resolve_or_unit(scope, &raw)
                    .or_else(|| {
                        if *order > 0 {
                            self.table.resolve_or_unit(scope, name)
                        } else {
                            None
                        }
                    });

                match resolved {
                    Some(id) => {
                        *symbol = Some(id);
                        self.table.symbol_mut(id).referenced = true;

                        // Forward references: only parameters and
                        // initial_values may look ahead in their own block.
                        if let Some(block) = ctx.block {
                            let target = self.table.symbol(id);
                            if !block.allows_forward_references()
                                && target.block == Some(block)
                                && target.decl_index >= ctx.decl_index
                                && ctx.decl_index != u32::MAX
                            {
                                self.diags.push(
                                    Diagnostic::error(
                                        DiagnosticKind::ForwardReference,
                                        span,
                                        format!("'{}' is used before its declaration", raw),
                                    )
                                    .with_label(target.span, "declared here")
                                    .in_neuron(&self.neuron_name),
                                );
                            }
                        }
                    }
                    None => {
                        self.diags.push(
                            Diagnostic::error(
                                DiagnosticKind::UnknownSymbol,
                                span,
                                format!("'{}' is not declared", raw),
                            )
                            .in_neuron(&self.neuron_name),
                        );
                    }
                }
            }
            ExprKind::Call { name, args } => {
                if let Some(id) = self.table.lookup(scope, name) {
                    self.table.symbol_mut(id).referenced = true;
                } else if !builtins::is_builtin(name) {
                    self.diags.push(
                        Diagnostic::error(
                            DiagnosticKind::UnknownSymbol,
                            span,
                            format!("function '{}' is not declared", name),
                        )
                        .in_neuron(&self.neuron_name),
                    );
                }
                for arg in args {
                    self.resolve_expr(arg, scope, ctx);
                }
            }
            ExprKind::Unary { operand, .. } => self.resolve_expr(operand, scope, ctx),
            ExprKind::Binary { left, right, .. } => {
                self.resolve_expr(left, scope, ctx);
                self.resolve_expr(right, scope, ctx);
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                self.resolve_expr(condition, scope, ctx);
                self.resolve_expr(then_expr, scope, ctx);
                self.resolve_expr(else_expr, scope, ctx);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestml_lexer::lex_with_spans;
    use nestml_parser::parse_compilation_unit;
    use std::path::Path;

    fn analyze(source: &str) -> (CompilationUnit, SymbolTable, Diagnostics) {
        let (tokens, _) = lex_with_spans(source);
        let (mut unit, errors) =
            parse_compilation_unit(&tokens, 0, Path::new("test.nestml"), None);
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        let mut diags = Diagnostics::new();
        let table = build_symbol_table(&mut unit, &mut diags);
        (unit, table, diags)
    }

    #[test]
    fn resolves_state_reference_in_update() {
        let (unit, table, diags) = analyze(
            "neuron n:\n  state:\n    V_m mV = 0 mV\n  end\n  update:\n    V_m = V_m\n  end\nend",
        );
        assert!(!diags.has_errors(), "{:?}", diags.entries());

        let scope = unit.neurons[0].scope.unwrap();
        let id = table.lookup(scope, "V_m").expect("V_m resolves");
        assert!(table.symbol(id).referenced);
        assert_eq!(table.symbol(id).block, Some(BlockKind::State));
    }

    #[test]
    fn unknown_reference_is_reported() {
        let (_, _, diags) =
            analyze("neuron n:\n  update:\n    V_m = 1\n  end\nend");
        assert!(diags.has_errors());
        assert!(diags
            .entries()
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnknownSymbol));
    }

    #[test]
    fn unit_symbols_resolve_via_fallback() {
        let (_, _, diags) = analyze(
            "neuron n:\n  parameters:\n    rate 1/ms = 0.3 / ms\n  end\nend",
        );
        assert!(!diags.has_errors(), "{:?}", diags.entries());
    }

    #[test]
    fn duplicate_declaration_is_reported() {
        let (_, _, diags) = analyze(
            "neuron n:\n  state:\n    V_m mV = 0 mV\n    V_m mV = 1 mV\n  end\nend",
        );
        assert_eq!(
            diags
                .entries()
                .iter()
                .filter(|d| d.kind == DiagnosticKind::DuplicateSymbol)
                .count(),
            1
        );
    }

    #[test]
    fn forward_reference_allowed_in_parameters() {
        let (_, _, diags) = analyze(
            "neuron n:\n  parameters:\n    a mV = b\n    b mV = 1 mV\n  end\nend",
        );
        assert!(!diags.has_errors(), "{:?}", diags.entries());
    }

    #[test]
    fn forward_reference_rejected_in_state() {
        let (_, _, diags) = analyze(
            "neuron n:\n  state:\n    a mV = b\n    b mV = 1 mV\n  end\nend",
        );
        assert!(diags
            .entries()
            .iter()
            .any(|d| d.kind == DiagnosticKind::ForwardReference));
    }

    #[test]
    fn reserved_name_rejected() {
        let (_, _, diags) =
            analyze("neuron n:\n  state:\n    ms real = 1\n  end\nend");
        assert!(diags
            .entries()
            .iter()
            .any(|d| d.kind == DiagnosticKind::ReservedName));
    }

    #[test]
    fn unused_parameter_warns() {
        let (_, _, diags) = analyze(
            "neuron n:\n  parameters:\n    tau ms = 10 ms\n  end\nend",
        );
        assert!(diags
            .entries()
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnusedSymbol
                && d.severity == nestml_ast::Severity::Warning));
    }

    #[test]
    fn derived_reference_falls_back_to_base() {
        let (_, _, diags) = analyze(
            "neuron n:\n  initial_values:\n    g nS = 0 nS\n    g' nS/ms = 0 nS / ms\n  end\n  equations:\n    shape g'' = -g' / t - g / (t * t)\n  end\nend",
        );
        assert!(!diags.has_errors(), "{:?}", diags.entries());
    }

    #[test]
    fn shape_symbol_installed() {
        let (unit, table, diags) = analyze(
            "neuron n:\n  parameters:\n    tau ms = 2 ms\n  end\n  equations:\n    shape g = exp(-t / tau)\n  end\nend",
        );
        assert!(!diags.has_errors(), "{:?}", diags.entries());
        let scope = unit.neurons[0].scope.unwrap();
        let id = table.lookup(scope, "g").unwrap();
        assert_eq!(table.symbol(id).kind, SymbolKind::Shape);
    }
}
