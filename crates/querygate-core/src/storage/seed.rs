//! Demo `employees` table for SQLite deployments and tests.

use anyhow::Context;
use chrono::{Duration, Utc};
use rusqlite::{params, Connection};
use std::path::Path;

pub const EMPLOYEES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS employees (
  employee_id INTEGER PRIMARY KEY AUTOINCREMENT,
  first_name TEXT NOT NULL,
  last_name TEXT NOT NULL,
  department TEXT NOT NULL,
  role TEXT NOT NULL,
  employment_status TEXT NOT NULL,
  hire_date TEXT NOT NULL,
  leave_type TEXT,
  salary_local NUMERIC(12,2) NOT NULL,
  salary_usd NUMERIC(12,2) NOT NULL,
  manager_name TEXT,
  created_at TEXT DEFAULT CURRENT_TIMESTAMP,
  updated_at TEXT DEFAULT CURRENT_TIMESTAMP
);
"#;

struct SeedEmployee {
    first_name: &'static str,
    last_name: &'static str,
    department: &'static str,
    role: &'static str,
    status: &'static str,
    hired_days_ago: i64,
    leave_type: Option<&'static str>,
    salary_local: f64,
    salary_usd: f64,
    manager: Option<&'static str>,
}

#[allow(clippy::too_many_arguments)]
const fn emp(
    first_name: &'static str,
    last_name: &'static str,
    department: &'static str,
    role: &'static str,
    status: &'static str,
    hired_days_ago: i64,
    leave_type: Option<&'static str>,
    salary_local: f64,
    salary_usd: f64,
    manager: Option<&'static str>,
) -> SeedEmployee {
    SeedEmployee {
        first_name,
        last_name,
        department,
        role,
        status,
        hired_days_ago,
        leave_type,
        salary_local,
        salary_usd,
        manager,
    }
}

// Hire dates are relative to today so "hired in the last 6 months" always
// has matches.
const EMPLOYEES: &[SeedEmployee] = &[
    emp("Emma", "Johnson", "Engineering", "Software Engineer", "Active", 120, None, 95_000.0, 95_000.0, Some("Sarah Williams")),
    emp("Liam", "Martinez", "Marketing", "Marketing Coordinator", "Active", 90, None, 62_000.0, 62_000.0, Some("Michael Thompson")),
    emp("Sophia", "Davis", "Sales", "Sales Representative", "Active", 60, None, 68_000.0, 68_000.0, Some("John Doe")),
    emp("Noah", "Garcia", "Engineering", "DevOps Engineer", "Active", 30, None, 105_000.0, 105_000.0, Some("Sarah Williams")),
    emp("Olivia", "Rodriguez", "HR", "HR Specialist", "Active", 150, None, 58_000.0, 58_000.0, Some("Jennifer Lee")),
    emp("Sarah", "Williams", "Engineering", "Engineering Manager", "Active", 2_100, None, 145_000.0, 145_000.0, Some("David Chen")),
    emp("Michael", "Thompson", "Marketing", "Marketing Director", "Active", 1_800, None, 128_000.0, 128_000.0, Some("David Chen")),
    emp("John", "Doe", "Sales", "Sales Manager", "Active", 1_500, None, 118_000.0, 118_000.0, Some("David Chen")),
    emp("Jennifer", "Lee", "HR", "HR Manager", "Active", 1_650, None, 102_000.0, 102_000.0, Some("David Chen")),
    emp("David", "Chen", "Executive", "Chief Executive Officer", "Active", 3_200, None, 250_000.0, 250_000.0, None),
    emp("Ava", "Brown", "Engineering", "Senior Software Engineer", "On Leave", 900, Some("Parental Leave"), 132_000.0, 132_000.0, Some("Sarah Williams")),
    emp("Ethan", "Wilson", "Finance", "Financial Analyst", "On Leave", 700, Some("Medical Leave"), 76_000.0, 76_000.0, Some("Grace Kim")),
    emp("Mia", "Anderson", "Sales", "Account Executive", "On Leave", 480, Some("Sick Leave"), 71_000.0, 71_000.0, Some("John Doe")),
    emp("Grace", "Kim", "Finance", "Finance Manager", "Active", 1_400, None, 115_000.0, 115_000.0, Some("David Chen")),
    emp("Lucas", "Schmidt", "Engineering", "Software Engineer", "Active", 400, None, 78_000.0, 84_500.0, Some("Sarah Williams")),
    emp("Yuki", "Tanaka", "Engineering", "Data Engineer", "Active", 610, None, 11_500_000.0, 78_200.0, Some("Sarah Williams")),
    emp("James", "Taylor", "Marketing", "Content Strategist", "Terminated", 1_100, None, 64_000.0, 64_000.0, Some("Michael Thompson")),
    emp("Chloe", "Dubois", "Sales", "Sales Representative", "Terminated", 800, None, 49_000.0, 53_000.0, Some("John Doe")),
];

/// Creates `employees` if needed and fills it when empty. Returns the number
/// of rows inserted (0 when the table already had data).
pub fn seed_employees(conn: &mut Connection) -> anyhow::Result<usize> {
    conn.execute_batch(EMPLOYEES_DDL)?;

    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM employees", [], |row| row.get(0))?;
    if existing > 0 {
        tracing::info!(event = "seed_skipped", existing);
        return Ok(0);
    }

    let today = Utc::now().date_naive();
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO employees(first_name, last_name, department, role, employment_status,
                                   hire_date, leave_type, salary_local, salary_usd, manager_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for e in EMPLOYEES {
            let hire_date = today - Duration::days(e.hired_days_ago);
            stmt.execute(params![
                e.first_name,
                e.last_name,
                e.department,
                e.role,
                e.status,
                hire_date.format("%Y-%m-%d").to_string(),
                e.leave_type,
                e.salary_local,
                e.salary_usd,
                e.manager,
            ])?;
        }
    }
    tx.commit()?;

    tracing::info!(event = "seed_completed", rows = EMPLOYEES.len());
    Ok(EMPLOYEES.len())
}

pub fn seed_employees_at(path: &Path) -> anyhow::Result<usize> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
    seed_employees(&mut conn)
}
