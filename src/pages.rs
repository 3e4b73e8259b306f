//! Server-rendered HTML for the search and detail pages.

use crate::tmdb::{SearchResults, SeriesDetails, POSTER_BASE, POSTER_THUMB_BASE};
use crate::utils::escape;
use anyhow::Result;

const STYLE: &str = "body{font-family:sans-serif;max-width:56rem;margin:0 auto;padding:1.5rem;color:#111827}\
table{width:100%;border-collapse:collapse}td,th{padding:.5rem;text-align:left;vertical-align:top;border-bottom:1px solid #e5e7eb}\
.card{border:1px solid #e5e7eb;border-radius:.5rem;margin-bottom:1rem}.card h2{font-size:1rem;margin:0;padding:.75rem 1rem;border-bottom:1px solid #e5e7eb}\
.card .body{padding:1rem}.muted{color:#6b7280}.error{color:#b91c1c}.poster{width:10rem;height:14rem;object-fit:cover;border-radius:.25rem;background:#f3f4f6}\
.thumb{width:3rem;height:4rem;object-fit:cover;border-radius:.25rem;background:#f3f4f6;display:block}.row{display:flex;gap:1.5rem}.grow{flex:1}";

/// What the ratings card shows on the detail page.
#[derive(Debug, Clone, PartialEq)]
pub enum Chart {
    Ready(String),
    Unavailable,
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>{}</title><style>{STYLE}</style></head><body>{body}</body></html>",
        escape(title)
    )
}

fn back_link() -> &'static str {
    "<p><a href=\"/\">← Back to Search</a></p>"
}

pub fn search(query: &str, outcome: Option<Result<SearchResults>>) -> String {
    let mut body = String::new();
    body.push_str("<h1>TV Search</h1>");
    body.push_str(&format!(
        "<form method=\"get\" action=\"/\"><input type=\"search\" name=\"q\" placeholder=\"Search TV shows...\" value=\"{}\"> <button type=\"submit\">Search</button></form>",
        escape(query)
    ));
    match outcome {
        None => {}
        Some(Err(_)) => {
            body.push_str("<p class=\"error\">Error: Failed to fetch from TMDB.</p>");
        }
        Some(Ok(results)) if results.results.is_empty() => {
            body.push_str("<p class=\"muted\">No results.</p>");
        }
        Some(Ok(results)) => {
            body.push_str(
                "<table><thead><tr><th>Poster</th><th>Name</th><th>First Aired</th><th>Overview</th></tr></thead><tbody>",
            );
            for item in &results.results {
                let href = format!("/tv/{}", item.id);
                let poster = match &item.poster_path {
                    Some(p) => format!(
                        "<img class=\"thumb\" src=\"{POSTER_THUMB_BASE}{}\" alt=\"{}\">",
                        escape(p),
                        escape(&item.name)
                    ),
                    None => "<div class=\"thumb\"></div>".to_string(),
                };
                let overview = if item.overview.is_empty() {
                    "No overview available."
                } else {
                    item.overview.as_str()
                };
                body.push_str(&format!(
                    "<tr><td><a href=\"{href}\">{poster}</a></td><td><strong><a href=\"{href}\">{}</a></strong></td><td class=\"muted\">{}</td><td>{}</td></tr>",
                    escape(&item.name),
                    escape(item.first_air_date.as_deref().unwrap_or("—")),
                    escape(overview)
                ));
            }
            body.push_str("</tbody></table>");
        }
    }
    layout("TV Search", &body)
}

pub fn detail(details: &SeriesDetails, chart: &Chart) -> String {
    let mut body = String::new();
    body.push_str(back_link());
    body.push_str(&format!("<h1>{}</h1><p class=\"muted\">", escape(&details.name)));
    if let Some(date) = &details.first_air_date {
        body.push_str(&format!("First aired: {}", escape(date)));
    }
    if let Some(rating) = details.vote_average {
        body.push_str(&format!(" <span>Rating: {:.1}</span>", rating));
    }
    body.push_str("</p><div class=\"row\">");

    match &details.poster_path {
        Some(p) => {
            body.push_str(&format!(
                "<img class=\"poster\" src=\"{POSTER_BASE}{}\" alt=\"{}\">",
                escape(p),
                escape(&details.name)
            ));
        }
        None => body.push_str("<div class=\"poster\"></div>"),
    }

    let overview = if details.overview.is_empty() {
        "No overview available."
    } else {
        details.overview.as_str()
    };
    let genres = if details.genres.is_empty() {
        "—".to_string()
    } else {
        details
            .genres
            .iter()
            .map(|g| g.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let count = |n: Option<u32>| n.map(|n| n.to_string()).unwrap_or_else(|| "—".to_string());

    body.push_str(&format!(
        "<div class=\"grow\"><section class=\"card\"><h2>Overview</h2><div class=\"body\"><p>{}</p></div></section>\
<section class=\"card\"><h2>Details</h2><div class=\"body\"><p><span class=\"muted\">Seasons: </span>{}</p>\
<p><span class=\"muted\">Episodes: </span>{}</p><p><span class=\"muted\">Genres: </span>{}</p></div></section>",
        escape(overview),
        count(details.number_of_seasons),
        count(details.number_of_episodes),
        escape(&genres)
    ));

    body.push_str("<section class=\"card\"><h2>Episode Ratings</h2><div class=\"body\">");
    match chart {
        Chart::Ready(svg) => body.push_str(svg),
        Chart::Unavailable => body.push_str("<p class=\"muted\">Episode ratings are unavailable.</p>"),
    }
    body.push_str("</div></section></div></div>");
    layout(&details.name, &body)
}

pub fn detail_error() -> String {
    let body = format!(
        "{}<p class=\"error\">Failed to load TV show details.</p>",
        back_link()
    );
    layout("TV Details", &body)
}
