//! Named block extraction.
//!
//! A block is delimited by `<!--$beginblock$$NAME$-->` and
//! `<!--$endblock$$NAME$-->` markers. Extraction captures exactly the
//! characters between the markers whose name matches the one requested;
//! markers for other names pass through verbatim, so unrelated sibling or
//! nested blocks survive inside the captured stream.

use std::any::Any;

use crate::error::GatewayError;
use crate::tags::parser::{marker_fields, Element, ElementType, Parser, ParserContext};

const BEGIN_SIGIL: &str = "<!--$beginblock$";
const END_SIGIL: &str = "<!--$endblock$";

/// Marker payload arity: keyword, empty slot, name, trailing empty.
const BLOCK_MARKER_FIELDS: usize = 4;

/// Element type for block markers.
pub struct BlockType;

/// The one shared block element type.
pub static BLOCK_TYPE: BlockType = BlockType;

impl ElementType for BlockType {
    fn is_start_tag(&self, tag: &str) -> bool {
        tag.starts_with(BEGIN_SIGIL)
    }

    fn is_end_tag(&self, tag: &str) -> bool {
        tag.starts_with(END_SIGIL)
    }

    fn new_instance(&self) -> Box<dyn Element> {
        Box::new(BlockElement::default())
    }
}

/// Handler for one begin/end marker pair.
#[derive(Default)]
pub struct BlockElement {
    name_matches: bool,
}

impl Element for BlockElement {
    fn on_tag_start(
        &mut self,
        tag: &str,
        ctx: &mut ParserContext<'_>,
    ) -> Result<(), GatewayError> {
        let fields = marker_fields(tag)?;
        if fields.len() != BLOCK_MARKER_FIELDS {
            return Err(GatewayError::AggregationSyntax(format!(
                "Invalid syntax: {tag}"
            )));
        }
        let name = fields[2];

        let Some(renderer) = ctx.find_ancestor::<BlockRenderer>() else {
            return Ok(());
        };
        self.name_matches = name == renderer.name();
        if self.name_matches {
            renderer.set_write(true);
        } else {
            // Foreign block marker: opaque pass-through.
            renderer.append(tag);
        }
        Ok(())
    }

    fn on_tag_end(&mut self, tag: &str, ctx: &mut ParserContext<'_>) {
        let Some(renderer) = ctx.find_ancestor::<BlockRenderer>() else {
            return;
        };
        if self.name_matches {
            renderer.set_write(false);
        } else {
            renderer.append(tag);
        }
    }

    fn characters(&mut self, text: &str, ctx: &mut ParserContext<'_>) {
        if let Some(renderer) = ctx.find_ancestor::<BlockRenderer>() {
            renderer.append(text);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Capture context for one named block extraction.
pub struct BlockRenderer {
    name: String,
    write: bool,
    content: String,
}

impl BlockRenderer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            write: false,
            content: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_write(&mut self, write: bool) {
        self.write = write;
    }

    /// Append text to the capture buffer while in writing mode.
    pub fn append(&mut self, text: &str) {
        if self.write {
            self.content.push_str(text);
        }
    }

    /// Run one extraction pass over `src` for block `name`.
    pub fn render(name: &str, src: &str) -> Result<String, GatewayError> {
        let mut renderer = BlockRenderer::new(name);
        Parser::new(&[&BLOCK_TYPE]).parse(src, &mut renderer)?;
        Ok(renderer.content)
    }
}

impl Element for BlockRenderer {
    fn on_tag_start(
        &mut self,
        _tag: &str,
        _ctx: &mut ParserContext<'_>,
    ) -> Result<(), GatewayError> {
        Ok(())
    }

    fn on_tag_end(&mut self, _tag: &str, _ctx: &mut ParserContext<'_>) {}

    fn characters(&mut self, text: &str, _ctx: &mut ParserContext<'_>) {
        self.append(text);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
