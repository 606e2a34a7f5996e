//! HTML documentation of the registered module types
//!
//! Written by the primary builder in `--docs` mode. Lists every module type
//! with its default stage and properties, followed by the modules declared
//! in the current graph.

use std::{fmt::Write as _, fs, path::Path};

use anyhow::{Context, Result};

use crate::{
    descriptor::{ModuleType, SourceProvider as _},
    module_graph::ModuleGraph,
};

pub fn render_docs(builder_name: &str, graph: &ModuleGraph) -> String {
    let mut html = String::new();
    // Writing to a String cannot fail
    let _ = write_page(&mut html, builder_name, graph);
    html
}

pub fn write_docs(path: &Path, builder_name: &str, graph: &ModuleGraph) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, render_docs(builder_name, graph))
        .with_context(|| format!("failed to write docs {}", path.display()))
}

fn write_page(out: &mut String, builder_name: &str, graph: &ModuleGraph) -> std::fmt::Result {
    let title = escape_html(builder_name);
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html>")?;
    writeln!(out, "<head><meta charset=\"utf-8\"><title>{title} module types</title></head>")?;
    writeln!(out, "<body>")?;
    writeln!(out, "<h1>{title} module types</h1>")?;

    for module_type in ModuleType::ALL {
        writeln!(out, "<h2 id=\"{0}\">{0}</h2>", module_type.name())?;
        writeln!(out, "<p>{}</p>", escape_html(module_type.description()))?;
        writeln!(out, "<p>Default stage: {}</p>", module_type.default_stage())?;
        writeln!(out, "<dl>")?;
        for (name, doc) in module_type.properties() {
            writeln!(out, "<dt>{name}</dt><dd>{}</dd>", escape_html(doc))?;
        }
        writeln!(out, "</dl>")?;
    }

    if !graph.is_empty() {
        writeln!(out, "<h2>Modules</h2>")?;
        writeln!(out, "<ul>")?;
        for node in graph.modules() {
            let srcs = node.descriptor.sources().srcs().join(", ");
            writeln!(
                out,
                "<li>{} ({}): {}</li>",
                escape_html(&node.name),
                node.descriptor.kind(),
                escape_html(&srcs)
            )?;
        }
        writeln!(out, "</ul>")?;
    }

    writeln!(out, "</body>")?;
    writeln!(out, "</html>")
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
