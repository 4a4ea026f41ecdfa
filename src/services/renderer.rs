//! HTML rendering with embedded Tera templates.

use crate::error::AppError;
use crate::services::session::RequestContext;
use tera::{Context, Tera};

// Baked into the binary; names ending in `.html` are auto-escaped.
const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("dashboard.html", include_str!("../templates/dashboard.html")),
    ("boards.html", include_str!("../templates/boards.html")),
    ("pipelines.html", include_str!("../templates/pipelines.html")),
    (
        "pipeline_detail.html",
        include_str!("../templates/pipeline_detail.html"),
    ),
    ("confirm_run.html", include_str!("../templates/confirm_run.html")),
    ("edit_yaml.html", include_str!("../templates/edit_yaml.html")),
    ("mirror/index.html", include_str!("../templates/mirror/index.html")),
    ("mirror/boards.html", include_str!("../templates/mirror/boards.html")),
    (
        "mirror/pipelines.html",
        include_str!("../templates/mirror/pipelines.html"),
    ),
];

/// Renders pages with the shared layout variables filled in.
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    pub fn new() -> Result<Self, AppError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())?;
        Ok(Self { tera })
    }

    /// Render `name`. Every page gets `title`, `user` and `selected_project`.
    pub fn render(
        &self,
        name: &str,
        title: &str,
        request: &RequestContext,
        mut context: Context,
    ) -> Result<String, AppError> {
        context.insert("title", title);
        context.insert("user", &request.user);
        context.insert("selected_project", &request.project);

        self.tera.render(name, &context).map_err(|e| {
            let err = AppError::from(e);
            log::error!("[server] Failed to render {}: {}", name, err);
            err
        })
    }

    #[cfg(test)]
    fn render_plain(&self, name: &str, context: &Context) -> Result<String, AppError> {
        Ok(self.tera.render(name, context)?)
    }
}
