//! Streaming tag parser.
//!
//! # Responsibilities
//! - Scan a character stream for `<!--$ ... -->` marker tokens
//! - Dispatch marker and character events to pluggable element types
//! - Thread a parse-context stack so elements can find enclosing renderers
//!
//! # Data Flow
//! ```text
//! input stream
//!     → scan for marker tokens
//!     → start marker: instantiate element, on_tag_start, push unless closed
//!     → end marker matching innermost element: pop, on_tag_end
//!     → anything else: characters to the innermost element (or the root)
//! ```
//!
//! # Design Decisions
//! - Not an HTML parser: only marker tokens are special, everything else
//!   is opaque character data
//! - Ancestor lookup walks the explicit context stack, never a global
//!   registry, so concurrent independent renders cannot interfere
//! - An unterminated marker is treated as plain text
//! - Element errors propagate; the parser does not recover mid-tag

use std::any::Any;

use crate::error::GatewayError;

/// Marker token opening sigil.
pub const TAG_OPEN: &str = "<!--$";
/// Marker token terminator.
pub const TAG_CLOSE: &str = "-->";

/// Recognizes markers belonging to one element kind and creates handlers.
pub trait ElementType: Sync {
    fn is_start_tag(&self, tag: &str) -> bool;
    fn is_end_tag(&self, tag: &str) -> bool;
    fn new_instance(&self) -> Box<dyn Element>;
}

/// One active element on the parse stack.
pub trait Element: Any {
    /// Handle a start marker. Errors propagate to the parse call.
    fn on_tag_start(
        &mut self,
        tag: &str,
        ctx: &mut ParserContext<'_>,
    ) -> Result<(), GatewayError>;

    /// Handle the matching end marker.
    fn on_tag_end(&mut self, tag: &str, ctx: &mut ParserContext<'_>);

    /// Handle character data delivered while this element is innermost.
    fn characters(&mut self, text: &str, ctx: &mut ParserContext<'_>);

    /// Whether the element completes within its start marker (no end tag).
    fn is_closed(&self) -> bool {
        false
    }

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// View of the enclosing parse state handed to element callbacks.
pub struct ParserContext<'a> {
    ancestors: &'a mut [(usize, Box<dyn Element>)],
    root: Option<&'a mut dyn Element>,
}

impl ParserContext<'_> {
    /// Nearest enclosing element (or the root renderer) of concrete type `T`.
    pub fn find_ancestor<T: Element>(&mut self) -> Option<&mut T> {
        for (_, element) in self.ancestors.iter_mut().rev() {
            if let Some(found) = element.as_any_mut().downcast_mut::<T>() {
                return Some(found);
            }
        }
        match &mut self.root {
            Some(root) => root.as_any_mut().downcast_mut::<T>(),
            None => None,
        }
    }
}

/// Generic marker-token parser over a fixed set of element types.
pub struct Parser<'t> {
    types: &'t [&'t dyn ElementType],
}

impl<'t> Parser<'t> {
    pub fn new(types: &'t [&'t dyn ElementType]) -> Self {
        Self { types }
    }

    /// Run the stream through `root`, dispatching marker and character
    /// events. The root element receives character data that falls outside
    /// every open element and serves as the outermost ancestor.
    pub fn parse(&self, src: &str, root: &mut dyn Element) -> Result<(), GatewayError> {
        let mut stack: Vec<(usize, Box<dyn Element>)> = Vec::new();
        let mut pos = 0;

        while let Some(found) = src[pos..].find(TAG_OPEN) {
            let tag_start = pos + found;
            let Some(found_end) = src[tag_start..].find(TAG_CLOSE) else {
                break;
            };
            let tag_end = tag_start + found_end + TAG_CLOSE.len();
            let tag = &src[tag_start..tag_end];

            if tag_start > pos {
                deliver_characters(&mut stack, &mut *root, &src[pos..tag_start]);
            }
            pos = tag_end;

            // End marker for the innermost open element?
            let ends_innermost = stack
                .last()
                .map(|(type_index, _)| self.types[*type_index].is_end_tag(tag))
                .unwrap_or(false);
            if ends_innermost {
                if let Some((_, mut element)) = stack.pop() {
                    let mut ctx = ParserContext {
                        ancestors: &mut stack,
                        root: Some(&mut *root),
                    };
                    element.on_tag_end(tag, &mut ctx);
                }
                continue;
            }

            // Start marker for a known element type?
            if let Some(type_index) = self.types.iter().position(|t| t.is_start_tag(tag)) {
                let mut element = self.types[type_index].new_instance();
                let mut ctx = ParserContext {
                    ancestors: &mut stack,
                    root: Some(&mut *root),
                };
                element.on_tag_start(tag, &mut ctx)?;
                if !element.is_closed() {
                    stack.push((type_index, element));
                }
                continue;
            }

            // Unrecognized marker: plain text.
            deliver_characters(&mut stack, &mut *root, tag);
        }

        if pos < src.len() {
            deliver_characters(&mut stack, &mut *root, &src[pos..]);
        }
        Ok(())
    }
}

fn deliver_characters(
    stack: &mut Vec<(usize, Box<dyn Element>)>,
    root: &mut dyn Element,
    text: &str,
) {
    match stack.pop() {
        Some((type_index, mut element)) => {
            {
                let mut ctx = ParserContext {
                    ancestors: stack,
                    root: Some(root),
                };
                element.characters(text, &mut ctx);
            }
            stack.push((type_index, element));
        }
        None => {
            let mut ctx = ParserContext {
                ancestors: &mut [],
                root: None,
            };
            root.characters(text, &mut ctx);
        }
    }
}

/// Split a marker into its `$`-delimited payload fields.
///
/// The payload is the token minus the `<!--$` sigil and `-->` terminator.
pub fn marker_fields(tag: &str) -> Result<Vec<&str>, GatewayError> {
    let payload = tag
        .strip_prefix(TAG_OPEN)
        .and_then(|rest| rest.strip_suffix(TAG_CLOSE))
        .ok_or_else(|| GatewayError::AggregationSyntax(format!("Invalid syntax: {tag}")))?;
    Ok(payload.split('$').collect())
}
