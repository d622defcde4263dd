use crate::ast::*;
use crate::error::{ErrorKind, TemplateError};
use crate::expr::{Expr, parse_expression_at};
use log::{debug, trace};

type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug)]
enum NodeKind {
    Root,
    Text(String),
    Variable(Expr),
    Substitute(String),
    If {
        condition: Expr,
        else_ifs: Vec<NodeId>,
        else_node: Option<NodeId>,
    },
    /// Lives in its owner's `else_ifs`, never in a children list
    ElseIf { condition: Expr, owner: NodeId },
    Else { owner: NodeId },
    For { source: Expr },
}

impl NodeKind {
    fn keyword(&self) -> &'static str {
        match self {
            NodeKind::If { .. } => "if",
            NodeKind::ElseIf { .. } => "elseif",
            NodeKind::Else { .. } => "else",
            NodeKind::For { .. } => "for",
            _ => "",
        }
    }
}

#[derive(Debug)]
struct ArenaNode {
    kind: NodeKind,
    children: Vec<NodeId>,
    /// Branches point at their owner's parent so `@end` closes the whole chain
    parent: Option<NodeId>,
    span: Span,
}

/// Builds the block tree in one left-to-right scan of a document body.
///
/// Nodes live in an arena and refer to each other by index: the cursor moves
/// through parent links, and `@elseif`/`@else` find their `If` through the
/// owner index even after the `If` has been closed by a short form.
pub struct TreeBuilder<'a> {
    source: &'a str,
    offset: usize,
    position: Position,
    nodes: Vec<ArenaNode>,
    current: NodeId,
    text: String,
    text_start: Position,
    /// `If` closed by a short form that a directly following branch may join
    pending_if: Option<NodeId>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(source: &'a str, origin: Position) -> Self {
        let root = ArenaNode {
            kind: NodeKind::Root,
            children: Vec::new(),
            parent: None,
            span: Span::point(origin),
        };
        Self {
            source,
            offset: 0,
            position: origin,
            nodes: vec![root],
            current: ROOT,
            text: String::new(),
            text_start: origin,
            pending_if: None,
        }
    }

    pub fn build(mut self) -> Result<Template, TemplateError> {
        while let Some(ch) = self.peek() {
            if ch == '@' {
                self.directive()?;
            } else {
                self.push_text(ch);
                self.bump();
            }
        }
        self.flush_text();

        if self.current != ROOT {
            let open = &self.nodes[self.current];
            let keyword = open.kind.keyword();
            return Err(TemplateError::new(
                ErrorKind::UnclosedBlock,
                format!("This '@{}' block is never closed.", keyword),
                Span::point(self.position),
            )
            .with_related(open.span)
            .with_related_label(format!("'@{}' opened here", keyword))
            .with_help("Close with '@end'"));
        }

        debug!("built block tree with {} nodes", self.nodes.len());
        Ok(self.into_template())
    }

    fn directive(&mut self) -> Result<(), TemplateError> {
        let start = self.position;
        self.bump();

        if self.peek() == Some('@') {
            self.bump();
            self.push_text_at('@', start);
            return Ok(());
        }

        self.flush_text();

        if self.peek() == Some('{') {
            self.pending_if = None;
            let (inner, origin) = self.delimited('{', '}', ErrorKind::UnclosedBrace, start)?;
            let expr = parse_expression_at(inner, origin)?;
            trace!("variable block at {}:{}", start.line + 1, start.col + 1);
            self.attach(NodeKind::Variable(expr), Span::new(start, self.position));
            return Ok(());
        }

        let source = self.source;
        let word_from = self.offset;
        self.eat_while(|c| c.is_alphanumeric() || c == '_');
        let word = &source[word_from..self.offset];
        trace!("directive '@{}' at {}:{}", word, start.line + 1, start.col + 1);

        match word {
            "" => Err(TemplateError::new(
                ErrorKind::UnknownDirective,
                "Expected a directive after '@'.",
                Span::new(start, self.position),
            )
            .with_help("Write '@@' for a literal '@'")),

            "if" => {
                let condition = self.condition(start, "if")?;
                self.pending_if = None;
                let id = self.open(
                    NodeKind::If { condition, else_ifs: Vec::new(), else_node: None },
                    Span::new(start, self.position),
                );
                if self.eat_semicolon() {
                    self.close_short_form(id);
                    self.pending_if = Some(id);
                }
                Ok(())
            }

            "elseif" => {
                let owner = self.branch_owner(start, "elseif")?;
                let condition = self.condition(start, "elseif")?;
                let id = self.open_branch(
                    owner,
                    NodeKind::ElseIf { condition, owner },
                    Span::new(start, self.position),
                );
                if let NodeKind::If { else_ifs, .. } = &mut self.nodes[owner].kind {
                    else_ifs.push(id);
                }
                if self.eat_semicolon() {
                    self.close_short_form(id);
                    self.pending_if = Some(owner);
                }
                Ok(())
            }

            "else" => {
                let owner = self.branch_owner(start, "else")?;
                let id = self.open_branch(owner, NodeKind::Else { owner }, Span::new(start, self.position));
                if let NodeKind::If { else_node, .. } = &mut self.nodes[owner].kind {
                    *else_node = Some(id);
                }
                self.eat_semicolon();
                Ok(())
            }

            "for" => {
                let source = self.condition(start, "for")?;
                self.pending_if = None;
                let id = self.open(NodeKind::For { source }, Span::new(start, self.position));
                if self.eat_semicolon() {
                    self.close_short_form(id);
                }
                Ok(())
            }

            "end" => {
                self.pending_if = None;
                match self.nodes[self.current].parent {
                    Some(parent) => {
                        self.current = parent;
                        Ok(())
                    }
                    None => Err(TemplateError::new(
                        ErrorKind::UnexpectedEnd,
                        "'@end' without an open block.",
                        Span::new(start, self.position),
                    )
                    .with_help("Remove it, or open a block with '@if' or '@for'")),
                }
            }

            name => {
                self.pending_if = None;
                let name = name.to_string();
                self.attach(NodeKind::Substitute(name), Span::new(start, self.position));
                Ok(())
            }
        }
    }

    /// The `If` an `@elseif`/`@else` at `start` belongs to
    fn branch_owner(&self, start: Position, keyword: &str) -> Result<NodeId, TemplateError> {
        let span = Span::new(start, self.position);
        let owner = match (self.pending_if, &self.nodes[self.current].kind) {
            (Some(owner), _) => owner,
            (None, NodeKind::If { .. }) => self.current,
            (None, NodeKind::ElseIf { owner, .. }) => *owner,
            (None, NodeKind::Else { owner }) => {
                return Err(TemplateError::new(
                    ErrorKind::OrphanBranch,
                    format!("'@{}' cannot follow '@else'.", keyword),
                    span,
                )
                .with_related(self.nodes[*owner].span)
                .with_related_label("'@if' starts here"));
            }
            (None, _) => {
                return Err(TemplateError::new(
                    ErrorKind::OrphanBranch,
                    format!("'@{}' without a matching '@if'.", keyword),
                    span,
                )
                .with_help("Branches must directly continue an '@if' block"));
            }
        };

        if let NodeKind::If { else_node: Some(_), .. } = self.nodes[owner].kind {
            return Err(TemplateError::new(
                ErrorKind::OrphanBranch,
                format!("'@{}' cannot follow '@else'.", keyword),
                span,
            )
            .with_related(self.nodes[owner].span)
            .with_related_label("'@if' starts here"));
        }
        Ok(owner)
    }

    /// `(expr)` after a block keyword
    fn condition(&mut self, start: Position, keyword: &str) -> Result<Expr, TemplateError> {
        self.eat_while(|c| c == ' ' || c == '\t');
        if self.peek() != Some('(') {
            return Err(TemplateError::new(
                ErrorKind::UnexpectedToken,
                format!("Expected '(' after '@{}'.", keyword),
                Span::point(self.position),
            )
            .with_help(format!("Syntax: @{}(condition)", keyword)));
        }
        let (inner, origin) = self.delimited('(', ')', ErrorKind::UnclosedParen, start)?;
        parse_expression_at(inner, origin)
    }

    /// Balanced `open ... close` run, skipping string literals. Returns the
    /// inner text and where it starts.
    fn delimited(
        &mut self,
        open: char,
        close: char,
        kind: ErrorKind,
        directive_start: Position,
    ) -> Result<(&'a str, Position), TemplateError> {
        let source = self.source;
        self.bump();
        let inner_from = self.offset;
        let origin = self.position;
        let mut depth = 1usize;

        loop {
            match self.peek() {
                None => {
                    return Err(TemplateError::new(
                        kind,
                        format!("'{}' is never closed.", open),
                        Span::point(self.position),
                    )
                    .with_related(Span::new(directive_start, origin))
                    .with_related_label("opened here")
                    .with_help(format!("Close with '{}'", close)));
                }
                Some('"') => {
                    self.bump();
                    self.eat_while(|c| c != '"');
                    self.bump();
                }
                Some(c) if c == open => {
                    depth += 1;
                    self.bump();
                }
                Some(c) if c == close => {
                    depth -= 1;
                    if depth == 0 {
                        let inner = &source[inner_from..self.offset];
                        self.bump();
                        return Ok((inner, origin));
                    }
                    self.bump();
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    /// Consume `;` if only spaces or tabs stand before it
    fn eat_semicolon(&mut self) -> bool {
        let rest = &self.source[self.offset..];
        let pad = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        if !rest[pad..].starts_with(';') {
            return false;
        }
        for _ in 0..=pad {
            self.bump();
        }
        true
    }

    /// Take the rest of the line (newline included) as the block's only
    /// child and step back out of it
    fn close_short_form(&mut self, id: NodeId) {
        let start = self.position;
        let source = self.source;
        let from = self.offset;
        while let Some(ch) = self.bump() {
            if ch == '\n' {
                break;
            }
        }
        let line = &source[from..self.offset];
        if !line.is_empty() {
            self.attach(NodeKind::Text(line.to_string()), Span::new(start, self.position));
        }
        self.current = self.nodes[id].parent.unwrap_or(ROOT);
    }

    /// Add a node under the cursor
    fn attach(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(ArenaNode {
            kind,
            children: Vec::new(),
            parent: Some(self.current),
            span,
        });
        let current = self.current;
        self.nodes[current].children.push(id);
        id
    }

    /// Add a block under the cursor and descend into it
    fn open(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = self.attach(kind, span);
        self.current = id;
        id
    }

    /// Add a branch of `owner` (outside any children list) and descend into it
    fn open_branch(&mut self, owner: NodeId, kind: NodeKind, span: Span) -> NodeId {
        self.pending_if = None;
        let id = self.nodes.len();
        self.nodes.push(ArenaNode {
            kind,
            children: Vec::new(),
            parent: Some(self.nodes[owner].parent.unwrap_or(ROOT)),
            span,
        });
        self.current = id;
        id
    }

    fn push_text(&mut self, ch: char) {
        let at = self.position;
        self.push_text_at(ch, at);
    }

    fn push_text_at(&mut self, ch: char, at: Position) {
        if self.text.is_empty() {
            self.text_start = at;
        }
        self.text.push(ch);
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let content = std::mem::take(&mut self.text);
        if !content.trim().is_empty() {
            self.pending_if = None;
        }
        let span = Span::new(self.text_start, self.position);
        self.attach(NodeKind::Text(content), span);
    }

    fn peek(&self) -> Option<char> {
        self.source[self.offset..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.offset += ch.len_utf8();
        self.position.advance(ch);
        Some(ch)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            self.bump();
        }
    }

    fn into_template(mut self) -> Template {
        let roots = std::mem::take(&mut self.nodes[ROOT].children);
        Template::new(self.blocks(roots))
    }

    fn blocks(&mut self, ids: Vec<NodeId>) -> Vec<Block> {
        ids.into_iter().filter_map(|id| self.block(id)).collect()
    }

    fn take(&mut self, id: NodeId) -> (NodeKind, Vec<NodeId>, Span) {
        let node = &mut self.nodes[id];
        let kind = std::mem::replace(&mut node.kind, NodeKind::Root);
        (kind, std::mem::take(&mut node.children), node.span)
    }

    fn block(&mut self, id: NodeId) -> Option<Block> {
        let (kind, children, span) = self.take(id);
        match kind {
            NodeKind::Text(content) => Some(Block::Text(TextBlock { content, span })),
            NodeKind::Variable(expr) => Some(Block::Variable(VariableBlock { expr, span })),
            NodeKind::Substitute(name) => Some(Block::Substitute(SubstituteBlock { name, span })),
            NodeKind::For { source } => Some(Block::For(ForBlock {
                source,
                children: self.blocks(children),
                span,
            })),
            NodeKind::If { condition, else_ifs, else_node } => {
                let children = self.blocks(children);
                let else_ifs = else_ifs.into_iter().filter_map(|id| self.else_if(id)).collect();
                let else_block = else_node.and_then(|id| self.else_block(id));
                Some(Block::If(IfBlock { condition, children, else_ifs, else_block, span }))
            }
            NodeKind::Root | NodeKind::ElseIf { .. } | NodeKind::Else { .. } => None,
        }
    }

    fn else_if(&mut self, id: NodeId) -> Option<ElseIfBlock> {
        match self.take(id) {
            (NodeKind::ElseIf { condition, .. }, children, span) => Some(ElseIfBlock {
                condition,
                children: self.blocks(children),
                span,
            }),
            _ => None,
        }
    }

    fn else_block(&mut self, id: NodeId) -> Option<ElseBlock> {
        match self.take(id) {
            (NodeKind::Else { .. }, children, span) => Some(ElseBlock {
                children: self.blocks(children),
                span,
            }),
            _ => None,
        }
    }
}
