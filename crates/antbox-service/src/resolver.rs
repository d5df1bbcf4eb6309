//! `@`-operator resolution.
//!
//! A filter field beginning with `@` is a predicate about the node's
//! parent folder. Per conjunction: the `@` predicates are extracted
//! into a sub-query conjoined with `mimetype == FOLDER`, the sub-query
//! runs against the repository, and the predicates are replaced with
//! `parent in [found folder uuids]`. A sub-query with zero folders
//! eliminates its conjunction.

use serde_json::Value as JsonValue;
use tracing::trace;

use antbox_core::builtins::mimetypes;
use antbox_core::defaults::SCAN_PAGE_SIZE;
use antbox_core::{
    Filter, FilterGroup, FilterOperator, NodeFilters, NodeRepository, Result,
};

/// Resolve every parent predicate in `filters` against the repository.
///
/// Returns `None` when every conjunction was eliminated (the overall
/// result is provably empty).
pub async fn resolve_parent_predicates(
    repository: &dyn NodeRepository,
    filters: NodeFilters,
) -> Result<Option<NodeFilters>> {
    if !filters.has_parent_predicates() {
        return Ok(Some(filters));
    }

    let had_groups = !filters.groups.is_empty();
    let mut resolved = Vec::new();

    for group in filters.groups {
        let (parent_predicates, mut residual): (Vec<Filter>, Vec<Filter>) = group
            .0
            .into_iter()
            .partition(|filter| filter.is_parent_predicate());

        if parent_predicates.is_empty() {
            resolved.push(FilterGroup(residual));
            continue;
        }

        let mut sub_query: Vec<Filter> = parent_predicates
            .iter()
            .map(Filter::strip_parent_prefix)
            .collect();
        sub_query.push(Filter::new(
            "mimetype",
            FilterOperator::Equal,
            mimetypes::FOLDER,
        ));

        let folder_uuids = collect_uuids(repository, NodeFilters::conjunction(sub_query)).await?;
        trace!(result_count = folder_uuids.len(), "parent sub-query resolved");
        if folder_uuids.is_empty() {
            // No folder satisfies the predicates; the conjunction can
            // never match.
            continue;
        }

        residual.push(Filter::new(
            "parent",
            FilterOperator::In,
            JsonValue::Array(folder_uuids.into_iter().map(JsonValue::String).collect()),
        ));
        resolved.push(FilterGroup(residual));
    }

    if had_groups && resolved.is_empty() {
        return Ok(None);
    }
    Ok(Some(NodeFilters { groups: resolved }))
}

async fn collect_uuids(
    repository: &dyn NodeRepository,
    filters: NodeFilters,
) -> Result<Vec<String>> {
    let mut uuids = Vec::new();
    let mut page_token = 1;
    loop {
        let page = repository
            .filter(&filters, SCAN_PAGE_SIZE, page_token)
            .await?;
        uuids.extend(page.nodes.into_iter().map(|node| node.uuid));
        if page_token >= page.page_count {
            break;
        }
        page_token += 1;
    }
    Ok(uuids)
}
