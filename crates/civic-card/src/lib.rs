/// Civic Card Renderer
///
/// Turns a citizen's identity fields (and an optional photo) into an encoded
/// ID card image. Rendering is pure: nothing is read from or written to
/// storage after the templates are loaded, and photos only ever live in memory.

pub mod canvas;
pub mod error;
pub mod layout;
pub mod render;
pub mod template;

pub use canvas::{Canvas, RasterCanvas};
pub use error::{CardError, CardWarning};
pub use render::{CardFields, CardFormat, CardRenderer, RenderedCard};
pub use template::CardTemplates;
