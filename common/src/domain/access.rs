use crate::domain::{Article, ArticleAccess, Viewer};

/// Decides whether `viewer` may read `article`.
///
/// Public articles are readable by anyone, private ones only by their owner,
/// and link articles by their owner or by whoever presents the article's
/// access token. An empty supplied token never matches.
pub fn check_access(article: &Article, viewer: Viewer, supplied_token: Option<&str>) -> bool {
    match &article.access {
        ArticleAccess::Public => true,
        ArticleAccess::Private => article.is_owned_by(viewer),
        ArticleAccess::Link(token) => {
            article.is_owned_by(viewer) || supplied_token.is_some_and(|supplied| token.matches(supplied))
        }
    }
}
