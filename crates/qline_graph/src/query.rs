//! OData query options.

use qline_runtime::Queryable;

/// Setters for the OData `$` query parameters.
pub trait GraphQueryExt {
    fn select(&self, fields: &[&str]) -> &Self;
    fn expand(&self, fields: &[&str]) -> &Self;
    fn filter(&self, expression: &str) -> &Self;
    fn order_by(&self, field: &str, ascending: bool) -> &Self;
    fn top(&self, count: u32) -> &Self;
    fn skip(&self, count: u32) -> &Self;
    fn count(&self, include: bool) -> &Self;
    fn search(&self, expression: &str) -> &Self;
}

impl GraphQueryExt for Queryable {
    fn select(&self, fields: &[&str]) -> &Self {
        self.set_query("$select", fields.join(","))
    }

    fn expand(&self, fields: &[&str]) -> &Self {
        self.set_query("$expand", fields.join(","))
    }

    fn filter(&self, expression: &str) -> &Self {
        self.set_query("$filter", expression)
    }

    fn order_by(&self, field: &str, ascending: bool) -> &Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.set_query("$orderby", format!("{field} {direction}"))
    }

    fn top(&self, count: u32) -> &Self {
        self.set_query("$top", count.to_string())
    }

    fn skip(&self, count: u32) -> &Self {
        self.set_query("$skip", count.to_string())
    }

    fn count(&self, include: bool) -> &Self {
        self.set_query("$count", include.to_string())
    }

    fn search(&self, expression: &str) -> &Self {
        self.set_query("$search", format!("\"{expression}\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_options_render_in_order() {
        let users = Queryable::new("https://graph.microsoft.com/v1.0/users");
        users
            .select(&["id", "displayName"])
            .top(5)
            .order_by("displayName", false);

        assert_eq!(
            users.request_url(),
            "https://graph.microsoft.com/v1.0/users?$select=id%2CdisplayName&$top=5&$orderby=displayName%20desc"
        );
    }

    #[test]
    fn test_search_is_quoted() {
        let q = Queryable::new("https://h/v1.0/users");
        q.search("displayName:ada").count(true);
        assert_eq!(q.query_param("$search").as_deref(), Some("\"displayName:ada\""));
        assert_eq!(q.query_param("$count").as_deref(), Some("true"));
    }
}
