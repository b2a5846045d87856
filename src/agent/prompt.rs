use std::path::Path;

use super::classifier::TERMINATION_TOKEN;

/// System message for the solver. Built once per session from the loaded
/// dataset and reused for every question.
pub fn build_system_prompt(dataset_path: &Path, columns: &[String]) -> String {
    format!(
        r#"You are an expert at writing Python code to answer questions about tabular data.
You have been provided with the file {path}. It contains tabular data with the following columns:
`{columns}`

Rules:
1) Write valid Python code that answers the question. Load the file yourself with pandas.
2) You may use Python data analysis libraries such as pandas, numpy and matplotlib.
3) Print the result in a descriptive way, never as a single word or bare value.
4) Return the code in a fenced code block and make sure it runs without errors.
5) When asked for a chart, draw it with matplotlib and print the figure object.
6) Once your code has executed successfully, reply `{token}` and end the conversation immediately. Do not ask the user for confirmation first."#,
        path = dataset_path.display(),
        columns = python_list_literal(columns),
        token = TERMINATION_TOKEN,
    )
}

fn python_list_literal(items: &[String]) -> String {
    let quoted = items
        .iter()
        .map(|item| format!("'{}'", item.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect::<Vec<_>>();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::{build_system_prompt, python_list_literal};
    use std::path::Path;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    #[test]
    fn prompt_embeds_path_columns_and_termination_token() {
        let prompt = build_system_prompt(
            Path::new("/data/sales.csv"),
            &columns(&["region", "units", "unit price"]),
        );

        assert!(prompt.contains("/data/sales.csv"));
        assert!(prompt.contains("`['region', 'units', 'unit price']`"));
        assert!(prompt.contains("reply `TERMINATE`"));
        assert!(prompt.contains("Do not ask the user for confirmation"));
    }

    #[test]
    fn prompt_names_allowed_libraries_and_descriptive_output() {
        let prompt = build_system_prompt(Path::new("data.csv"), &columns(&["a"]));

        for library in ["pandas", "numpy", "matplotlib"] {
            assert!(prompt.contains(library), "missing {library}");
        }
        assert!(prompt.contains("descriptive"));
    }

    #[test]
    fn prompt_is_stable_for_same_inputs() {
        let cols = columns(&["a", "b"]);
        assert_eq!(
            build_system_prompt(Path::new("x.csv"), &cols),
            build_system_prompt(Path::new("x.csv"), &cols)
        );
    }

    #[test]
    fn list_literal_escapes_quotes() {
        assert_eq!(
            python_list_literal(&columns(&["it's", "a\\b"])),
            r"['it\'s', 'a\\b']"
        );
        assert_eq!(python_list_literal(&[]), "[]");
    }
}
