//! Include directives for page aggregation.
//!
//! A composed page absorbs fragments of other pages through
//! `<!--$includeblock$driver$page$block$-->` markers. Scanning records
//! where each marker sat and what it asked for; the gateway resolves the
//! fetches afterwards and splices the fragments back in. Keeping the scan
//! free of I/O keeps the parser single-pass and synchronous.

use std::any::Any;

use crate::error::GatewayError;
use crate::tags::parser::{marker_fields, Element, ElementType, Parser, ParserContext};

const INCLUDE_SIGIL: &str = "<!--$includeblock$";

/// Marker payload arity: keyword, driver, page, block, trailing empty.
const INCLUDE_MARKER_FIELDS: usize = 5;

/// Element type for include markers.
pub struct IncludeBlockType;

/// The one shared include element type.
pub static INCLUDE_BLOCK_TYPE: IncludeBlockType = IncludeBlockType;

impl ElementType for IncludeBlockType {
    fn is_start_tag(&self, tag: &str) -> bool {
        tag.starts_with(INCLUDE_SIGIL)
    }

    fn is_end_tag(&self, _tag: &str) -> bool {
        false
    }

    fn new_instance(&self) -> Box<dyn Element> {
        Box::new(IncludeBlockElement)
    }
}

/// One recorded include marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    /// Byte offset in the scanned output where the fragment belongs.
    pub at: usize,
    /// Driver name to fetch through.
    pub driver: String,
    /// Page path, relative to the driver's base URL.
    pub page: String,
    /// Block name inside the page; empty means the whole page body.
    pub block: String,
}

/// Standalone marker handler; lives only for the marker itself.
struct IncludeBlockElement;

impl Element for IncludeBlockElement {
    fn on_tag_start(
        &mut self,
        tag: &str,
        ctx: &mut ParserContext<'_>,
    ) -> Result<(), GatewayError> {
        let fields = marker_fields(tag)?;
        if fields.len() != INCLUDE_MARKER_FIELDS {
            return Err(GatewayError::AggregationSyntax(format!(
                "Invalid syntax: {tag}"
            )));
        }
        if fields[1].is_empty() || fields[2].is_empty() {
            return Err(GatewayError::AggregationSyntax(format!(
                "Include marker needs driver and page: {tag}"
            )));
        }

        if let Some(renderer) = ctx.find_ancestor::<AggregateRenderer>() {
            renderer.record(IncludeDirective {
                at: renderer.out.len(),
                driver: fields[1].to_owned(),
                page: fields[2].to_owned(),
                block: fields[3].to_owned(),
            });
        }
        Ok(())
    }

    fn on_tag_end(&mut self, _tag: &str, _ctx: &mut ParserContext<'_>) {}

    fn characters(&mut self, _text: &str, _ctx: &mut ParserContext<'_>) {}

    fn is_closed(&self) -> bool {
        true
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Collects page text and pending include directives during one scan.
pub struct AggregateRenderer {
    out: String,
    directives: Vec<IncludeDirective>,
}

impl AggregateRenderer {
    fn record(&mut self, directive: IncludeDirective) {
        self.directives.push(directive);
    }

    /// Scan a page for include markers.
    ///
    /// Returns the page with the markers removed, plus the directives in
    /// document order. Splicing each fragment at its offset in reverse
    /// order reconstitutes the composed page.
    pub fn scan(src: &str) -> Result<(String, Vec<IncludeDirective>), GatewayError> {
        let mut renderer = AggregateRenderer {
            out: String::new(),
            directives: Vec::new(),
        };
        Parser::new(&[&INCLUDE_BLOCK_TYPE]).parse(src, &mut renderer)?;
        Ok((renderer.out, renderer.directives))
    }
}

impl Element for AggregateRenderer {
    fn on_tag_start(
        &mut self,
        _tag: &str,
        _ctx: &mut ParserContext<'_>,
    ) -> Result<(), GatewayError> {
        Ok(())
    }

    fn on_tag_end(&mut self, _tag: &str, _ctx: &mut ParserContext<'_>) {}

    fn characters(&mut self, text: &str, _ctx: &mut ParserContext<'_>) {
        self.out.push_str(text);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_records_directive_and_strips_marker() {
        let src = "<html><!--$includeblock$shop$/cart.html$summary$--></html>";
        let (out, directives) = AggregateRenderer::scan(src).unwrap();
        assert_eq!(out, "<html></html>");
        assert_eq!(
            directives,
            vec![IncludeDirective {
                at: 6,
                driver: "shop".into(),
                page: "/cart.html".into(),
                block: "summary".into(),
            }]
        );
    }

    #[test]
    fn test_scan_keeps_document_order() {
        let src = "a<!--$includeblock$d1$/p1$b1$-->b<!--$includeblock$d2$/p2$$-->c";
        let (out, directives) = AggregateRenderer::scan(src).unwrap();
        assert_eq!(out, "abc");
        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0].at, 1);
        assert_eq!(directives[1].at, 2);
        assert_eq!(directives[1].block, "");
    }

    #[test]
    fn test_missing_driver_is_syntax_error() {
        let src = "<!--$includeblock$$/page$b$-->";
        assert!(AggregateRenderer::scan(src).is_err());
    }

    #[test]
    fn test_page_without_markers_is_unchanged() {
        let src = "<html><body>plain</body></html>";
        let (out, directives) = AggregateRenderer::scan(src).unwrap();
        assert_eq!(out, src);
        assert!(directives.is_empty());
    }
}
