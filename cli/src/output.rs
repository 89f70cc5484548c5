use spc_model::{ChartConfig, ConnectionResult, DataSource, ValidationErrors};

pub fn sources_table(sources: &[DataSource]) -> String {
    if sources.is_empty() {
        return "No data sources.".to_string();
    }
    let mut out = format!(
        "{:<5} {:<24} {:<9} {:<28} {:<20} {}\n",
        "ID", "NAME", "ENGINE", "HOST", "DATABASE", "ACTIVE"
    );
    for s in sources {
        out.push_str(&format!(
            "{:<5} {:<24} {:<9} {:<28} {:<20} {}\n",
            s.id,
            s.name,
            s.engine,
            format!("{}:{}", s.host, s.port),
            s.database_name,
            if s.is_active { "yes" } else { "no" }
        ));
    }
    out
}

pub fn charts_table(charts: &[ChartConfig]) -> String {
    if charts.is_empty() {
        return "No chart configurations.".to_string();
    }
    let mut out = format!(
        "{:<5} {:<28} {:<20} {:<24} {}\n",
        "ID", "TITLE", "SOURCE", "TABLE", "AGGREGATION"
    );
    for c in charts {
        out.push_str(&format!(
            "{:<5} {:<28} {:<20} {:<24} {} x{}\n",
            c.id,
            c.display_name(),
            c.data_source_name,
            c.table_name,
            c.aggregation_type,
            c.aggregation_size
        ));
    }
    out
}

fn limit(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn chart_details(c: &ChartConfig) -> String {
    format!(
        "Chart #{id}: {name}\n\
         Source:      {source} (#{source_id})\n\
         Table:       {table}\n\
         Value:       {value}\n\
         Timestamp:   {datetime}\n\
         Product:     {product_col} = {product}\n\
         Operation:   {operation_col} = {operation}\n\
         Limits:      LSL {lsl}  target {target}  USL {usl}\n\
         Aggregation: {agg} ({agg_label}), size {size}\n\
         WECO rules:  {weco}",
        id = c.id,
        name = c.display_name(),
        source = c.data_source_name,
        source_id = c.data_source,
        table = c.table_name,
        value = c.value_column,
        datetime = c.datetime_column,
        product_col = c.product_column,
        product = c.product_identifier.as_deref().unwrap_or("*"),
        operation_col = c.operation_column,
        operation = c.operation_identifier.as_deref().unwrap_or("*"),
        lsl = limit(c.lower_spec_limit),
        target = limit(c.target),
        usl = limit(c.upper_spec_limit),
        agg = c.aggregation_type,
        agg_label = c.aggregation_type.label(),
        size = c.aggregation_size,
        weco = c.weco_rules,
    )
}

pub fn connection_result(name: &str, result: &ConnectionResult) -> String {
    if result.success {
        format!("{}: {}", name, result.message)
    } else {
        format!("{}: connection failed: {}", name, result.message)
    }
}

pub fn validation_errors(errors: &ValidationErrors) -> String {
    errors
        .fields()
        .flat_map(|(field, messages)| {
            messages
                .iter()
                .map(move |message| format!("  {}: {}", field, message))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use spc_model::Engine;

    fn source() -> DataSource {
        DataSource {
            id: 1,
            name: "Line1".into(),
            engine: Engine::Mssql,
            host: "10.0.0.5".into(),
            port: 1433,
            database_name: "PROD".into(),
            username: "svc".into(),
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn table_lists_each_source() {
        let table = sources_table(&[source()]);
        assert!(table.contains("Line1"));
        assert!(table.contains("10.0.0.5:1433"));
        assert_eq!(sources_table(&[]), "No data sources.");
    }

    #[test]
    fn errors_one_per_line() {
        let mut errors = ValidationErrors::single("port", "too big");
        errors.add("name", "blank");
        assert_eq!(validation_errors(&errors), "  name: blank\n  port: too big");
    }

    #[test]
    fn failed_connection_says_so() {
        let text = connection_result("Line1", &ConnectionResult::failed("Login failed"));
        assert_eq!(text, "Line1: connection failed: Login failed");
    }
}
