//! Path-to-service route matching.
//!
//! Each configured route path is scored against the request path and the
//! most specific match wins. Literal segments score 10, `:name`
//! placeholders 5, a `/prefix/*` wildcard 10 per prefix segment, and the
//! catch-all `/*` scores 0. On a tie the earlier route wins.

use crate::config::model::Route;

const LITERAL: u32 = 10;
const PLACEHOLDER: u32 = 5;

#[must_use]
pub fn match_route<'a>(routes: &'a [Route], path: &str, method: &str) -> Option<&'a Route> {
    let request: Vec<&str> = segments(path).collect();

    let mut best: Option<(u32, &'a Route)> = None;
    for route in routes {
        if !method_matches(&route.methods, method) {
            continue;
        }
        let Some(score) = specificity(&route.path, &request) else {
            continue;
        };
        if best.map_or(true, |(best_score, _)| score > best_score) {
            best = Some((score, route));
        }
    }
    best.map(|(_, route)| route)
}

#[allow(clippy::cast_possible_truncation)]
fn specificity(pattern: &str, request: &[&str]) -> Option<u32> {
    if pattern == "/*" || pattern == "*" {
        return Some(0);
    }

    if let Some(prefix) = pattern.strip_suffix("/*") {
        let prefix: Vec<&str> = segments(prefix).collect();
        let matched = request.len() >= prefix.len()
            && prefix.iter().zip(request).all(|(p, r)| p == r);
        return matched.then(|| prefix.len() as u32 * LITERAL);
    }

    let pattern: Vec<&str> = segments(pattern).collect();
    if pattern.len() != request.len() {
        return None;
    }
    pattern.iter().zip(request).try_fold(0, |score, (p, r)| {
        if p.starts_with(':') {
            Some(score + PLACEHOLDER)
        } else if p == r {
            Some(score + LITERAL)
        } else {
            None
        }
    })
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn method_matches(methods: &[String], method: &str) -> bool {
    methods
        .iter()
        .any(|m| m == "*" || m.eq_ignore_ascii_case(method))
}
