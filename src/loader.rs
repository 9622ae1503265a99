// Copyright 2024 by the alocador developers
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except in compliance with
// the License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Derivation of the model inputs from the raw tables: tuning parameters,
//! the two student populations with their planning-year grades, and the
//! waiting-list priority weights.

use std::collections::HashMap;

use chrono::NaiveDate;
use log::warn;

use crate::io::dataset::{Dataset, SerieRow};
use crate::{Parameters, Population, Student};

/// Read the tuning parameters from the `parametro` rows.
///
/// Values are coerced to integers; both native JSON numbers and
/// string-encoded numbers are accepted. All parameters except
/// `min_aluno_por_turma` are required.
pub fn parameters(data: &Dataset) -> Result<Parameters, String> {
    let mut values: HashMap<&str, i64> = HashMap::new();
    for row in data.parametro.iter() {
        values.insert(row.chave.as_str(), coerce_integer(&row.chave, &row.valor)?);
    }

    let require = |key: &str| -> Result<i64, String> {
        values
            .get(key)
            .copied()
            .ok_or(format!("Missing parameter '{}'.", key))
    };
    let require_count = |key: &str| -> Result<u32, String> {
        let value = require(key)?;
        if value < 0 {
            return Err(format!("Parameter '{}' must not be negative.", key));
        }
        Ok(value as u32)
    };

    let qtd_max_alunos = require_count("qtd_max_alunos")?;
    if qtd_max_alunos == 0 {
        return Err("Parameter 'qtd_max_alunos' must be positive.".to_owned());
    }

    Ok(Parameters {
        qtd_max_alunos,
        qtd_professores_acd: require_count("qtd_professores_acd")?,
        qtd_professores_pedagogico: require_count("qtd_professores_pedagogico")?,
        custo_aluno: require("custo_aluno")?,
        custo_professor: require("custo_professor")?,
        limite_custo: require("limite_custo")?,
        ano_planejamento: require("ano_planejamento")?,
        otimiza_dentro_do_ano: require("otimiza_dentro_do_ano")? != 0,
        possibilita_abertura_novas_turmas: require("possibilita_abertura_novas_turmas")? != 0,
        min_aluno_por_turma: match values.get("min_aluno_por_turma") {
            Some(v) if *v >= 0 => Some(*v as u32),
            Some(_) => {
                return Err("Parameter 'min_aluno_por_turma' must not be negative.".to_owned())
            }
            None => None,
        },
    })
}

/// Coerce a raw parameter value to an integer
fn coerce_integer(key: &str, value: &serde_json::Value) -> Result<i64, String> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or(format!("Parameter '{}' is not an integer: {}", key, n)),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("Parameter '{}' is not an integer: '{}'", key, s)),
        other => Err(format!("Parameter '{}' is not an integer: {}", key, other)),
    }
}

/// Load the two student populations from the `aluno` and
/// `formulario_inscricao` tables.
///
/// Enrolled students are filtered to those wishing to continue and joined
/// with the class catalog to recover their school and current grade.
/// Waiting-list applicants without a submission date are dropped. Both
/// populations get their planning-year grade assigned, are filtered to
/// active grades and sorted ascending by id; the waiting list additionally
/// receives its priority weights. The populations are returned separately
/// (enrolled, waitlisted) and never concatenated, since several model
/// constraints apply to only one of them.
pub fn load_students(
    data: &Dataset,
    params: &Parameters,
) -> Result<(Vec<Student>, Vec<Student>), String> {
    let series: HashMap<u32, &SerieRow> = data.serie.iter().map(|r| (r.id, r)).collect();
    let grade_is_active = |grade_id: u32| {
        series
            .get(&grade_id)
            .map(|serie| serie.ativa == 1)
            .unwrap_or(false)
    };
    let catalog: HashMap<u32, (u32, u32)> = data
        .turma
        .iter()
        .map(|t| (t.id, (t.escola_id, t.serie_id)))
        .collect();

    // Grades are promoted by one year unless the NGO replans within the
    // current school year; enrolled students repeating a grade stay put.
    let promotion_active = !params.otimiza_dentro_do_ano;

    let mut enrolled = Vec::new();
    for row in data.aluno.iter() {
        if row.continua != 1 {
            continue;
        }
        let turma_id = match row.turma_id {
            Some(id) => id,
            None => {
                warn!(
                    "Ignoring enrolled student {}, who wants to continue but has no current class.",
                    row.id
                );
                continue;
            }
        };
        let (school_id, current_grade_id) = match catalog.get(&turma_id) {
            Some(entry) => *entry,
            None => {
                warn!(
                    "Ignoring enrolled student {}, whose class {} is not in the class catalog.",
                    row.id, turma_id
                );
                continue;
            }
        };
        let repeated = row.reprova != 0;
        let new_grade_id = if promotion_active && !repeated {
            current_grade_id + 1
        } else {
            current_grade_id
        };
        if !grade_is_active(new_grade_id) {
            continue;
        }
        enrolled.push(Student {
            index: 0,
            id: row.id,
            population: Population::Enrolled,
            school_id,
            new_grade_id,
            cluster: turma_id,
            enrollment_date: None,
            priority_weight: 1.0,
        });
    }

    let mut waitlisted = Vec::new();
    for row in data.formulario_inscricao.iter() {
        let date = match row.data_inscricao.as_ref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y").map_err(|e| {
                format!(
                    "Invalid 'data_inscricao' for form entry {}: {}",
                    row.id, e
                )
            })?,
            None => {
                warn!(
                    "Dropping form entry {}, which has no enrollment date.",
                    row.id
                );
                continue;
            }
        };
        let years_behind = if promotion_active {
            params.ano_planejamento - row.ano_referencia
        } else {
            0
        };
        let new_grade_id = match promote_grade(row.serie_id, years_behind) {
            Some(grade_id) if grade_is_active(grade_id) => grade_id,
            _ => continue,
        };
        waitlisted.push(Student {
            index: 0,
            id: row.id,
            population: Population::Waitlisted,
            school_id: row.escola_id,
            new_grade_id,
            cluster: 0,
            enrollment_date: Some(date),
            priority_weight: 0.0,
        });
    }

    enrolled.sort_by_key(|s| s.id);
    waitlisted.sort_by_key(|s| s.id);
    for (i, s) in enrolled.iter_mut().enumerate() {
        s.index = i;
    }
    for (i, s) in waitlisted.iter_mut().enumerate() {
        s.index = i;
    }
    assign_priority_weights(&mut waitlisted);

    Ok((enrolled, waitlisted))
}

/// Apply a (possibly negative) grade offset, discarding students whose
/// resulting grade falls outside the grade id space
fn promote_grade(grade_id: u32, offset: i64) -> Option<u32> {
    let promoted = grade_id as i64 + offset;
    if promoted >= 0 {
        Some(promoted as u32)
    } else {
        None
    }
}

/// Assign the waiting-list priority weights: the descending dense rank of
/// the submission date divided by the population size, so the earliest
/// applicant receives the highest weight and all weights stay in (0, 1].
fn assign_priority_weights(waitlisted: &mut [Student]) {
    let mut distinct_dates: Vec<NaiveDate> =
        waitlisted.iter().filter_map(|s| s.enrollment_date).collect();
    distinct_dates.sort_unstable();
    distinct_dates.dedup();

    let population = waitlisted.len() as f64;
    for student in waitlisted.iter_mut() {
        let date = student
            .enrollment_date
            .expect("waitlisted students without a date are dropped at load time");
        let position = distinct_dates
            .binary_search(&date)
            .expect("every remaining date is in the distinct list");
        student.priority_weight = (distinct_dates.len() - position) as f64 / population;
    }
}
