//! Prompt text for the SQL generator and the judge scorer.

pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

pub const EMPLOYEE_SCHEMA: &str = "Table: employees
Columns:
- employee_id (INTEGER, PRIMARY KEY)
- first_name (VARCHAR(100))
- last_name (VARCHAR(100))
- department (VARCHAR(100)) - e.g., 'Engineering', 'Marketing', 'Sales', 'HR', 'Finance'
- role (VARCHAR(100)) - e.g., 'Software Engineer', 'Product Manager'
- employment_status (VARCHAR(50)) - 'Active', 'Terminated', 'On Leave'
- hire_date (DATE)
- leave_type (VARCHAR(50)) - 'Parental Leave', 'Medical Leave', 'Sick Leave', or NULL
- salary_local (DECIMAL(12,2))
- salary_usd (DECIMAL(12,2))
- manager_name (VARCHAR(200))
- created_at (TIMESTAMP)
- updated_at (TIMESTAMP)
";

/// Richer schema description handed to the judge as grounding context.
pub const JUDGE_SCHEMA_CONTEXT: &str = "Table: employees

Column definitions:
- employee_id: INTEGER, primary key, unique identifier
- first_name, last_name: VARCHAR(100)
- department: VARCHAR(100), e.g. 'Engineering', 'Marketing', 'Sales', 'HR', 'Finance'
- role: VARCHAR(100), job title
- employment_status: VARCHAR(50), one of 'Active', 'Terminated', 'On Leave'
- hire_date: DATE (YYYY-MM-DD), never in the future
- leave_type: VARCHAR(50), one of 'Parental Leave', 'Medical Leave', 'Sick Leave', or NULL;
  only populated when employment_status = 'On Leave'
- salary_local: DECIMAL(12,2), salary in local currency, always positive
- salary_usd: DECIMAL(12,2), salary converted to USD, always positive
- manager_name: VARCHAR(200), direct manager; NULL only for executives
- created_at, updated_at: TIMESTAMP
";

const FEW_SHOTS: &[(&str, &str)] = &[
    (
        "Show me employees in Engineering with salary greater than 120K",
        "SELECT * FROM employees WHERE department = 'Engineering' AND salary_usd > 120000",
    ),
    (
        "List employees hired in the last 6 months",
        "SELECT * FROM employees WHERE hire_date >= CURRENT_DATE - INTERVAL '6 months'",
    ),
    (
        "Who is on parental leave?",
        "SELECT * FROM employees WHERE leave_type = 'Parental Leave'",
    ),
    (
        "How many employees are in each department?",
        "SELECT department, COUNT(*) AS headcount FROM employees GROUP BY department",
    ),
    (
        "Show employees managed by John Doe",
        "SELECT * FROM employees WHERE manager_name = 'John Doe'",
    ),
];

pub fn sql_system_prompt(table: &str) -> String {
    let mut out = format!(
        "You are a SQL query generator for an HR employee database.

CRITICAL RULES:
1. Generate ONLY a single SELECT statement
2. Never generate DELETE, DROP, UPDATE, INSERT, ALTER, CREATE or TRUNCATE statements
3. Only query the '{table}' table; never join other tables
4. Do not add comments or statement terminators
5. Reply with the SQL only

When querying for employees on leave (parental, medical, sick), filter ONLY by leave_type.

If the request cannot be fulfilled with a SELECT query, respond with: \"{INVALID_REQUEST}\"

Schema:
{EMPLOYEE_SCHEMA}
Examples:
"
    );
    for (question, sql) in FEW_SHOTS {
        out.push_str(&format!("User: \"{question}\"\nSQL: {sql}\n\n"));
    }
    out
}

pub const JUDGE_SYSTEM_PROMPT: &str = "You grade answers produced by a natural-language-to-SQL system.
Rate three dimensions, each a number between 0.0 and 1.0:
- faithfulness: are the claims in the answer supported by the schema context?
- answer_relevance: does the answer address the user's question?
- context_precision: is the schema context that was used relevant to the question?
Respond with a single JSON object and nothing else:
{\"faithfulness\": <number>, \"answer_relevance\": <number>, \"context_precision\": <number>}";

pub fn judge_prompt(question: &str, sql: &str, answer: &str) -> String {
    format!(
        "Schema context:\n{JUDGE_SCHEMA_CONTEXT}\nQuestion: {question}\nGenerated SQL: {sql}\nAnswer: {answer}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_names_table_and_sentinel() {
        let p = sql_system_prompt("employees");
        assert!(p.contains("Only query the 'employees' table"));
        assert!(p.contains(INVALID_REQUEST));
        assert!(p.contains("GROUP BY department"));
    }
}
