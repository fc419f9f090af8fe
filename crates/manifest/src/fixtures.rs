//! Package archives built in memory, for tests.

use quick_xml::escape::escape;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builds a minimal but well-formed `.nupkg` archive.
///
/// # Examples
///
/// ```
/// use nupack_manifest::fixtures::NupkgBuilder;
///
/// let archive = NupkgBuilder::new("Foo", "1.0.0")
///     .element("description", "A test package")
///     .dependency_group(Some("net6.0"), [("Bar", "[1.0.0, )")])
///     .build();
/// let manifest = nupack_manifest::extract(&archive).unwrap();
/// assert_eq!(manifest.dependency_ids(), ["Bar"]);
/// ```
#[derive(Debug, Clone)]
pub struct NupkgBuilder {
    id: String,
    version: String,
    manifest_name: Option<String>,
    elements: Vec<(String, String)>,
    groups: Vec<(Option<String>, Vec<(String, String)>)>,
    files: Vec<(String, Vec<u8>)>,
}

impl NupkgBuilder {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            manifest_name: None,
            elements: Vec::new(),
            groups: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Add a `<metadata>` child element, e.g. `("authors", "Alice, Bob")`.
    pub fn element(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.elements.push((name.into(), value.into()));
        self
    }

    /// Add a dependency group. `None` adds an ungrouped list.
    pub fn dependency_group<'a>(
        mut self,
        target_framework: Option<&str>,
        dependencies: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let dependencies = dependencies.into_iter().map(|(id, range)| (id.to_string(), range.to_string())).collect();
        self.groups.push((target_framework.map(str::to_string), dependencies));
        self
    }

    /// Store the manifest under `name` instead of `{id}.nuspec`.
    pub fn manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = Some(name.into());
        self
    }

    /// Add an arbitrary payload file to the archive.
    pub fn file(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.push((path.into(), contents.into()));
        self
    }

    fn dependency(out: &mut String, id: &str, range: &str) {
        match range.is_empty() {
            true => out.push_str(&format!("<dependency id=\"{}\" />", escape(id))),
            false => out.push_str(&format!("<dependency id=\"{}\" version=\"{}\" />", escape(id), escape(range))),
        }
    }

    /// The `.nuspec` document this builder packs.
    pub fn nuspec(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
        out.push_str(r#"<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd"><metadata>"#);
        out.push_str(&format!("<id>{}</id><version>{}</version>", escape(&self.id), escape(&self.version)));
        for (name, value) in &self.elements {
            out.push_str(&format!("<{name}>{}</{name}>", escape(value)));
        }
        if !self.groups.is_empty() {
            out.push_str("<dependencies>");
            for (target_framework, dependencies) in &self.groups {
                if let Some(tfm) = target_framework {
                    out.push_str(&format!("<group targetFramework=\"{}\">", escape(tfm)));
                }
                for (id, range) in dependencies {
                    Self::dependency(&mut out, id, range);
                }
                if target_framework.is_some() {
                    out.push_str("</group>");
                }
            }
            out.push_str("</dependencies>");
        }
        out.push_str("</metadata></package>");
        out
    }

    /// Pack the archive.
    ///
    /// Panics if the in-memory zip writer fails. If test setup is wrong, then
    /// the test should not pass.
    pub fn build(&self) -> Vec<u8> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let manifest = self.manifest_name.clone().unwrap_or_else(|| format!("{}.nuspec", self.id));
        let entries = std::iter::once((manifest.as_str(), self.nuspec().into_bytes()))
            .chain(self.files.iter().map(|(path, contents)| (path.as_str(), contents.clone())));
        for (path, contents) in entries {
            if let Err(e) = writer.start_file(path, options).and_then(|()| Ok(writer.write_all(&contents)?)) {
                panic!("NupkgBuilder::build: cannot write {path}: {e}");
            }
        }
        match writer.finish() {
            Ok(cursor) => cursor.into_inner(),
            Err(e) => panic!("NupkgBuilder::build: cannot finish archive: {e}"),
        }
    }
}
