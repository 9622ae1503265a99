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

//! The mixed-integer allocation model.
//!
//! The module declares one binary open/close variable per candidate class
//! and one binary placement variable per (student, compatible class) pair,
//! adds the placement, cohort, capacity and budget constraints, maximizes
//! the weighted coverage objective and extracts the chosen allocation from
//! the solver's incumbent. Students and classes are iterated in a fixed
//! order (waitlist before enrolled, both ascending by id; classes ascending
//! by id), so repeated runs build an identical model and solver logs stay
//! comparable.

use std::collections::{BTreeMap, HashMap};

use good_lp::{
    default_solver, variable, variables, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use log::{debug, info};

use crate::{Allocation, CandidateClass, Parameters, Population, Student};

/// Big-M coefficient of the aggregated cohort constraint; must exceed the
/// size of any cohort
const BIG_M: f64 = 1000.0;

/// Cohorts up to this size keep their members together through pairwise
/// equalities; larger cohorts switch to the big-M aggregation, which scales
/// linearly instead of quadratically with the cohort size
const PAIRWISE_COHORT_LIMIT: usize = 8;

/// Objective penalty per empty seat in an opened class; small enough that
/// it never outweighs a placement's priority and grade weights
const EMPTY_SEAT_PENALTY: f64 = 0.01;

/// One binary student-in-class decision variable
struct PlacementVar {
    population: Population,
    /// Position of the student in its population's sequence
    student: usize,
    /// Position of the class in the candidate set
    class: usize,
    var: Variable,
}

/// A student may only be placed in classes of its own school and its
/// planning-year grade
fn compatible(student: &Student, class: &CandidateClass) -> bool {
    class.school_id == student.school_id && class.grade_id == student.new_grade_id
}

/// Weight favoring lower grades:
/// `(max_grade + 1 - grade) / (5 * (max_grade + 1))`, where `max_grade` is
/// the highest grade in the candidate set. Together with the priority
/// weight in (0, 1] this bounds a placement's objective contribution to
/// (0, 1/5), keeping the applicant priority dominant over the grade
/// preference, which in turn dominates the empty-seat penalty.
pub fn grade_weight(grade_id: u32, max_grade_id: u32) -> f64 {
    let top = max_grade_id as f64 + 1.0;
    (top - grade_id as f64) / (5.0 * top)
}

/// Build and solve the allocation model.
///
/// # Result
///
/// * `Ok(Some(allocation))`: the solver found an optimal or feasible
///   placement (an empty problem trivially counts as solved).
/// * `Ok(None)`: the model is infeasible, e.g. an indivisible cohort
///   exceeds the class capacity or an enrolled student has no candidate
///   class of the right school and grade.
/// * `Err(message)`: the solver library failed.
pub fn solve(
    params: &Parameters,
    enrolled: &[Student],
    waitlisted: &[Student],
    classes: &[CandidateClass],
) -> Result<Option<Allocation>, String> {
    if (enrolled.is_empty() && waitlisted.is_empty()) || classes.is_empty() {
        info!("Nothing to optimize: no students or no candidate classes.");
        return Ok(Some(Allocation {
            enrolled: vec![None; enrolled.len()],
            waitlisted: vec![None; waitlisted.len()],
            opened: vec![false; classes.len()],
            objective: 0.0,
        }));
    }
    debug_assert!(
        classes.windows(2).all(|w| w[0].class_id < w[1].class_id),
        "candidate classes must be ordered by id"
    );

    let mut vars = variables!();
    let class_vars = declare_class_vars(&mut vars, classes);
    let placements = declare_placement_vars(&mut vars, enrolled, waitlisted, classes);
    debug!(
        "Declared {} placement variables for {} students and {} candidate classes.",
        placements.len(),
        enrolled.len() + waitlisted.len(),
        classes.len()
    );

    let objective = build_objective(params, enrolled, waitlisted, classes, &class_vars, &placements);

    let mut model = vars.maximise(objective.clone()).using(default_solver);
    model = add_placement_count_constraints(model, enrolled, waitlisted, &placements);
    model = add_cohort_constraints(model, enrolled, classes, &placements);
    model = add_capacity_constraints(model, params, classes, &class_vars, &placements);
    model = add_budget_constraint(model, params, &class_vars, &placements);

    match model.solve() {
        Ok(solution) => {
            let objective_value = solution.eval(objective);
            Ok(Some(extract_allocation(
                objective_value,
                &solution,
                enrolled,
                waitlisted,
                classes,
                &class_vars,
                &placements,
            )))
        }
        Err(ResolutionError::Infeasible) => Ok(None),
        Err(e) => Err(format!("Solver failure: {}", e)),
    }
}

/// Declare one open/close variable per candidate class, named `class_{id}`
fn declare_class_vars(vars: &mut ProblemVariables, classes: &[CandidateClass]) -> Vec<Variable> {
    classes
        .iter()
        .map(|c| vars.add(variable().binary().name(format!("class_{}", c.class_id))))
        .collect()
}

/// Declare one placement variable per (student, compatible class) pair,
/// named `student_{population}_{id}_{class_id}`.
///
/// Only compatible pairs get a variable; the candidate set is usually
/// sparse in (school, grade), so declaring the full cross product would
/// blow up the model for nothing.
fn declare_placement_vars(
    vars: &mut ProblemVariables,
    enrolled: &[Student],
    waitlisted: &[Student],
    classes: &[CandidateClass],
) -> Vec<PlacementVar> {
    let mut placements = Vec::new();
    for student in waitlisted.iter().chain(enrolled.iter()) {
        for (class_index, class) in classes.iter().enumerate() {
            if !compatible(student, class) {
                continue;
            }
            let var = vars.add(variable().binary().name(format!(
                "student_{}_{}_{}",
                student.population.tag(),
                student.id,
                class.class_id
            )));
            placements.push(PlacementVar {
                population: student.population,
                student: student.index,
                class: class_index,
                var,
            });
        }
    }
    placements
}

/// Placement count per student.
///
/// Enrolled students who want to continue must be placed in exactly one
/// class, waiting-list applicants in at most one:
///
/// `SUM(c, x[s,c]) = 1` for enrolled `s`,
/// `SUM(c, x[s,c]) <= 1` for waitlisted `s`.
fn add_placement_count_constraints<M: SolverModel>(
    mut model: M,
    enrolled: &[Student],
    waitlisted: &[Student],
    placements: &[PlacementVar],
) -> M {
    for student in enrolled.iter() {
        let sum = placement_sum(placements, Population::Enrolled, student.index);
        model = model.with(
            sum.eq(1.0)
                .set_name(format!("enrolled_must_be_placed_{}", student.id)),
        );
    }
    for student in waitlisted.iter() {
        let sum = placement_sum(placements, Population::Waitlisted, student.index);
        model = model.with(
            sum.leq(1.0)
                .set_name(format!("waitlisted_at_most_one_{}", student.id)),
        );
    }
    model
}

/// Sum of one student's placement variables
fn placement_sum(placements: &[PlacementVar], population: Population, student: usize) -> Expression {
    let mut sum = Expression::from(0.0);
    for p in placements
        .iter()
        .filter(|p| p.population == population && p.student == student)
    {
        sum = sum + p.var;
    }
    sum
}

/// Cohort continuity: enrolled students who shared a class keep sharing one.
///
/// For every cohort and every compatible class, all members' placement
/// variables must take the same value. Small cohorts state this as pairwise
/// equalities `x[s,c] = x[s',c]`; larger ones aggregate per member:
///
/// `SUM(s' in cohort, x[s',c]) <= M * x[s,c]`
///
/// which forces the same all-or-nothing behavior with one constraint per
/// member instead of one per member pair.
fn add_cohort_constraints<M: SolverModel>(
    mut model: M,
    enrolled: &[Student],
    classes: &[CandidateClass],
    placements: &[PlacementVar],
) -> M {
    let mut cohorts: BTreeMap<u32, Vec<&Student>> = BTreeMap::new();
    for student in enrolled.iter() {
        cohorts.entry(student.cluster).or_default().push(student);
    }

    let placement_var: HashMap<(usize, usize), Variable> = placements
        .iter()
        .filter(|p| p.population == Population::Enrolled)
        .map(|p| ((p.student, p.class), p.var))
        .collect();

    for (cluster, members) in cohorts.iter() {
        debug_assert!(
            members.len() < BIG_M as usize,
            "cohort {} exceeds the big-M coefficient",
            cluster
        );
        for (class_index, class) in classes.iter().enumerate() {
            let member_vars: Vec<(&Student, Variable)> = members
                .iter()
                .filter_map(|s| {
                    placement_var
                        .get(&(s.index, class_index))
                        .map(|var| (*s, *var))
                })
                .collect();
            if member_vars.len() < 2 {
                continue;
            }

            if members.len() <= PAIRWISE_COHORT_LIMIT {
                for (i, (first, first_var)) in member_vars.iter().enumerate() {
                    for (second, second_var) in member_vars[i + 1..].iter() {
                        model = model.with((*first_var - *second_var).eq(0.0).set_name(format!(
                            "cohort_stays_together_{}_{}_{}_{}",
                            cluster, class.class_id, first.id, second.id
                        )));
                    }
                }
            } else {
                let mut sum = Expression::from(0.0);
                for (_, var) in member_vars.iter() {
                    sum = sum + *var;
                }
                for (member, var) in member_vars.iter() {
                    model = model.with((sum.clone() - BIG_M * *var).leq(0.0).set_name(format!(
                        "cohort_stays_together_{}_{}_{}",
                        cluster, class.class_id, member.id
                    )));
                }
            }
        }
    }
    model
}

/// Capacity, gated by the open decision:
///
/// `SUM(s, x[s,c]) <= qtd_max_alunos * y[c]`
///
/// so a closed class takes no students and an open one at most the
/// configured capacity.
fn add_capacity_constraints<M: SolverModel>(
    mut model: M,
    params: &Parameters,
    classes: &[CandidateClass],
    class_vars: &[Variable],
    placements: &[PlacementVar],
) -> M {
    for (class_index, class) in classes.iter().enumerate() {
        let mut sum = Expression::from(0.0);
        for p in placements.iter().filter(|p| p.class == class_index) {
            sum = sum + p.var;
        }
        model = model.with(
            (sum - params.qtd_max_alunos as f64 * class_vars[class_index])
                .leq(0.0)
                .set_name(format!("capacity_gated_by_open_{}", class.class_id)),
        );
    }
    model
}

/// Global cost ceiling:
///
/// `custo_aluno * SUM(s,c, x[s,c])
///  + (qtd_professores_acd + qtd_professores_pedagogico) * custo_professor * SUM(c, y[c])
///  <= limite_custo`
fn add_budget_constraint<M: SolverModel>(
    mut model: M,
    params: &Parameters,
    class_vars: &[Variable],
    placements: &[PlacementVar],
) -> M {
    let teachers_per_class =
        (params.qtd_professores_acd + params.qtd_professores_pedagogico) as f64;
    let cost_per_class = teachers_per_class * params.custo_professor as f64;

    let mut cost = Expression::from(0.0);
    for p in placements.iter() {
        cost = cost + params.custo_aluno as f64 * p.var;
    }
    for y in class_vars.iter() {
        cost = cost + cost_per_class * *y;
    }
    model.with(
        cost.leq(params.limite_custo as f64)
            .set_name("budget".to_owned()),
    )
}

/// The coverage objective:
///
/// `SUM(s,c, x[s,c] * priority_weight(s) * grade_weight(s))
///  - 0.01 * SUM(c, qtd_max_alunos * y[c] - SUM(s, x[s,c]))`
///
/// The first term rewards every placement, scaled by the applicant's
/// submission priority and the preference for younger grades. The second
/// term charges every empty seat of an opened class, steering the solver
/// towards few full classes instead of many half-empty ones. The penalty
/// runs over all candidate classes, so a class nobody can attend is never
/// worth opening.
fn build_objective(
    params: &Parameters,
    enrolled: &[Student],
    waitlisted: &[Student],
    classes: &[CandidateClass],
    class_vars: &[Variable],
    placements: &[PlacementVar],
) -> Expression {
    let max_grade_id = classes.iter().map(|c| c.grade_id).max().unwrap_or(0);

    let mut objective = Expression::from(0.0);
    for p in placements.iter() {
        let student = match p.population {
            Population::Enrolled => &enrolled[p.student],
            Population::Waitlisted => &waitlisted[p.student],
        };
        let weight = student.priority_weight * grade_weight(student.new_grade_id, max_grade_id);
        objective = objective + (weight + EMPTY_SEAT_PENALTY) * p.var;
    }
    for y in class_vars.iter() {
        objective = objective - EMPTY_SEAT_PENALTY * params.qtd_max_alunos as f64 * *y;
    }
    objective
}

/// Read the incumbent back into per-student placements and per-class open
/// flags. Solvers report binary variables as floats near 0 or 1, so values
/// are rounded before the comparison.
fn extract_allocation(
    objective_value: f64,
    solution: &impl Solution,
    enrolled: &[Student],
    waitlisted: &[Student],
    classes: &[CandidateClass],
    class_vars: &[Variable],
    placements: &[PlacementVar],
) -> Allocation {
    let opened: Vec<bool> = class_vars
        .iter()
        .map(|y| solution.value(*y).round() as i64 == 1)
        .collect();

    let mut enrolled_placements = vec![None; enrolled.len()];
    let mut waitlisted_placements = vec![None; waitlisted.len()];
    for p in placements.iter() {
        if solution.value(p.var).round() as i64 != 1 {
            continue;
        }
        let class_id = classes[p.class].class_id;
        match p.population {
            Population::Enrolled => enrolled_placements[p.student] = Some(class_id),
            Population::Waitlisted => waitlisted_placements[p.student] = Some(class_id),
        }
    }

    Allocation {
        enrolled: enrolled_placements,
        waitlisted: waitlisted_placements,
        opened,
        objective: objective_value,
    }
}

#[cfg(test)]
mod tests;
