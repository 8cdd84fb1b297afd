use apollo_compiler::ast;

/// Maximum selection depth over every operation and fragment definition of `document`.
///
/// The outermost selection set is level 1. Every nested selection set of a field or of an
/// inline fragment adds one level. A fragment spread counts as a selection at the level where it
/// appears; its body is measured with the fragment definition, on its own.
pub(crate) fn depth(document: &ast::Document) -> u32 {
    document
        .definitions
        .iter()
        .map(|definition| match definition {
            ast::Definition::OperationDefinition(operation) => {
                selection_set_depth(&operation.selection_set, 0)
            }
            ast::Definition::FragmentDefinition(fragment) => {
                selection_set_depth(&fragment.selection_set, 0)
            }
            _ => 0,
        })
        .max()
        .unwrap_or(0)
}

fn selection_set_depth(selection_set: &[ast::Selection], current_depth: u32) -> u32 {
    let next_depth = current_depth + 1;
    selection_set
        .iter()
        .map(|selection| match selection {
            ast::Selection::Field(field) if field.selection_set.is_empty() => next_depth,
            ast::Selection::Field(field) => selection_set_depth(&field.selection_set, next_depth),
            ast::Selection::InlineFragment(inline) => {
                selection_set_depth(&inline.selection_set, next_depth)
            }
            ast::Selection::FragmentSpread(_) => next_depth,
        })
        .max()
        .unwrap_or(next_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Query;

    fn depth_of(query: &str) -> u32 {
        depth(Query::parse(query).unwrap().document())
    }

    /// `levels` nested fields ending in a leaf.
    fn nested(levels: usize) -> String {
        let mut query = String::new();
        for level in 0..levels - 1 {
            query.push_str(&format!("f{level} {{ "));
        }
        query.push_str("leaf");
        query.push_str(&" }".repeat(levels - 1));
        format!("{{ {query} }}")
    }

    #[test]
    fn leaf_selection_is_level_one() {
        assert_eq!(depth_of("{ id }"), 1);
        assert_eq!(depth_of("{ customers { content { id } } }"), 3);
    }

    #[test]
    fn deepest_branch_wins() {
        assert_eq!(
            depth_of("{ a { b { c } } d { e } customers { content { orders { id } } } }"),
            4
        );
    }

    #[test]
    fn inline_fragments_add_a_level() {
        assert_eq!(depth_of("{ customer { ... on Customer { id } } }"), 3);
    }

    #[test]
    fn fragment_spreads_count_where_they_appear() {
        assert_eq!(
            depth_of(
                "{ customers { ...page } } \
                 fragment page on CustomerPage { content { orders { id } } }"
            ),
            3
        );
    }

    #[test]
    fn generated_nesting() {
        assert_eq!(depth_of(&nested(10)), 10);
        assert_eq!(depth_of(&nested(11)), 11);
    }
}
