//! HTML rendering of directory listings.
//!
//! The page template is embedded at compile time and lists folders first,
//! then files, each group in directory order. Listing rows carry links
//! relative to their directory; here they are turned into absolute links
//! under the URL prefix so the page works with or without a trailing slash
//! in the address bar.

use handlebars::Handlebars;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use protocol::{Listing, ListingEntry, PARENT_ENTRY};
use serde::Serialize;
use thiserror::Error;

use crate::files::href;

/// Errors that can occur while rendering a page.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Template rendering failed.
    #[error("template rendering failed: {0}")]
    RenderFailed(#[from] handlebars::RenderError),

    /// Template registration failed.
    #[error("template registration failed: {0}")]
    RegistrationFailed(#[from] handlebars::TemplateError),
}

/// Embedded listing page template.
const LISTING_TEMPLATE: &str = include_str!("templates/listing.hbs");

const LISTING: &str = "listing";

#[derive(Debug, Serialize)]
struct PageView<'a> {
    title: &'a str,
    prefix: &'a str,
    read_only: bool,
    folders: Vec<RowView>,
    files: Vec<RowView>,
}

#[derive(Debug, Serialize)]
struct RowView {
    name: String,
    link: String,
    size: String,
    ext: String,
    zip: Option<String>,
}

/// Percent-encode each segment of `path` onto `url`, keeping a trailing `/`.
fn push_segments(url: &mut String, path: &str) {
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        url.push_str(&href(segment));
        url.push('/');
    }
}

/// Absolute URL of the prefix, ending in `/`.
fn prefix_url(listing: &Listing) -> String {
    let mut url = String::from("/");
    push_segments(&mut url, &listing.extra_path);
    url
}

/// Absolute URL of the listed directory, ending in `/`.
fn directory_url(listing: &Listing) -> String {
    let mut url = prefix_url(listing);
    push_segments(&mut url, &listing.title);
    url
}

/// Archive download link for a folder row.
fn zip_link(listing: &Listing, folder: &str) -> String {
    let zip_path = format!(
        "{}{}{folder}",
        listing.extra_path,
        listing.title.trim_start_matches('/')
    );
    format!(
        "{}zip?zipPath={}&zipName={}",
        prefix_url(listing),
        utf8_percent_encode(&zip_path, NON_ALPHANUMERIC),
        utf8_percent_encode(folder, NON_ALPHANUMERIC)
    )
}

fn folder_row(listing: &Listing, base: &str, entry: &ListingEntry) -> RowView {
    if entry.name == PARENT_ENTRY {
        return RowView {
            name: entry.name.clone(),
            link: format!("{base}{PARENT_ENTRY}"),
            size: String::new(),
            ext: entry.ext.clone(),
            zip: None,
        };
    }

    let folder = entry.name.trim_end_matches('/');
    RowView {
        name: entry.name.clone(),
        link: format!("{base}{}/", entry.href),
        size: String::new(),
        ext: entry.ext.clone(),
        zip: Some(zip_link(listing, folder)),
    }
}

fn file_row(base: &str, entry: &ListingEntry) -> RowView {
    RowView {
        name: entry.name.clone(),
        link: format!("{base}{}", entry.href),
        size: entry.size.clone(),
        ext: entry.ext.clone(),
        zip: None,
    }
}

/// Renders listing pages from the embedded template.
pub struct PageRenderer {
    handlebars: Handlebars<'static>,
}

impl PageRenderer {
    /// Register the embedded template.
    pub fn new() -> Result<Self, RenderError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_template_string(LISTING, LISTING_TEMPLATE)?;
        Ok(Self { handlebars })
    }

    /// Render `listing` as a complete HTML page.
    pub fn render(&self, listing: &Listing) -> Result<String, RenderError> {
        let base = directory_url(listing);
        let view = PageView {
            title: &listing.title,
            prefix: &listing.extra_path,
            read_only: listing.read_only,
            folders: listing
                .folders
                .iter()
                .map(|entry| folder_row(listing, &base, entry))
                .collect(),
            files: listing
                .files
                .iter()
                .map(|entry| file_row(&base, entry))
                .collect(),
        };

        Ok(self.handlebars.render(LISTING, &view)?)
    }
}
