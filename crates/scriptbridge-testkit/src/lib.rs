//! A small reference interpreter for exercising the execution bridge.
//!
//! [`MiniInterpreter`] runs a Python-flavoured subset: indentation blocks,
//! `;`-separated statements, `def`/`async def`, `await`, `if`/`else`,
//! `try`/`except`/`finally`, `raise`, literals, `+`/`-`/`==`, indexing and the
//! bridge builtins (`print`, `send_result`, `input`, `report_exception`, `str`,
//! `len`, `int`), the plotting natives `plot`, `plot_raw` and `scene`, and
//! `read_file`/`write_file` over an in-memory filesystem.
//!
//! `input(...)` must be awaited. Scripts written with blocking input calls
//! only work after the bridge's rewrite, which is what the tests exercise.

mod ast;
mod lexer;
mod machine;
mod parser;
mod value;

use async_trait::async_trait;
use scriptbridge_core::{
    ArtifactExtractor, Canvas, CanvasExtractor, GuestException, GuestFs, GuestHost, Interpreter,
    MemoryFs, Namespace,
};

pub use lexer::SyntaxError;

use crate::machine::Machine;

const DEFAULT_MAX_DEPTH: usize = 64;

/// Reference [`Interpreter`] with a built-in plotting façade and an
/// in-memory filesystem.
#[derive(Debug, Clone, Default)]
pub struct MiniInterpreter {
    canvas: Canvas,
    fs: MemoryFs,
    max_depth: Option<usize>,
}

impl MiniInterpreter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit nested function calls.
    #[must_use]
    pub const fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// The plotting façade guest code draws into.
    #[must_use]
    pub const fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Raster and scene extractors over this interpreter's façade.
    #[must_use]
    pub fn extractors(&self) -> Vec<Box<dyn ArtifactExtractor>> {
        vec![
            Box::new(CanvasExtractor::raster(self.canvas.handle())),
            Box::new(CanvasExtractor::scene(self.canvas.handle())),
        ]
    }

    /// Check `source` without running it.
    ///
    /// # Errors
    /// Returns the first syntax error.
    pub fn check(source: &str) -> Result<(), SyntaxError> {
        parser::parse(source).map(drop)
    }
}

#[async_trait]
impl Interpreter for MiniInterpreter {
    fn name(&self) -> &str {
        "mini"
    }

    async fn execute(
        &mut self,
        source: &str,
        globals: &Namespace,
        host: &mut GuestHost<'_>,
    ) -> Result<(), GuestException> {
        let program = parser::parse(source).map_err(|e| {
            tracing::debug!(line = e.line, "syntax error: {}", e.message);
            GuestException::new("SyntaxError", e.to_string())
        })?;
        let depth = self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH);
        Machine::new(host, &mut self.fs, self.canvas.clone(), globals, depth)
            .run(&program)
            .await
    }

    fn filesystem(&mut self) -> Option<&mut dyn GuestFs> {
        Some(&mut self.fs)
    }
}
