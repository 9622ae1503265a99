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

use assert_float_eq::*;

use crate::{CandidateClass, Parameters, Population, Student};

fn test_params() -> Parameters {
    Parameters {
        qtd_max_alunos: 30,
        qtd_professores_acd: 1,
        qtd_professores_pedagogico: 1,
        custo_aluno: 1,
        custo_professor: 100,
        limite_custo: 1_000_000_000,
        ano_planejamento: 2025,
        otimiza_dentro_do_ano: true,
        possibilita_abertura_novas_turmas: false,
        min_aluno_por_turma: None,
    }
}

fn enrolled(index: usize, id: u32, school_id: u32, grade_id: u32, cluster: u32) -> Student {
    Student {
        index,
        id,
        population: Population::Enrolled,
        school_id,
        new_grade_id: grade_id,
        cluster,
        enrollment_date: None,
        priority_weight: 1.0,
    }
}

fn applicant(index: usize, id: u32, school_id: u32, grade_id: u32, weight: f64) -> Student {
    Student {
        index,
        id,
        population: Population::Waitlisted,
        school_id,
        new_grade_id: grade_id,
        cluster: 0,
        enrollment_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1),
        priority_weight: weight,
    }
}

fn class(class_id: u32, school_id: u32, grade_id: u32) -> CandidateClass {
    CandidateClass {
        class_id,
        school_id,
        grade_id,
        name: format!("Turma_{}", class_id),
    }
}

/// 45 applicants for one (school, grade) pair, ids 1..=45. Lower ids
/// submitted later and carry lower priority weights.
fn waitlist_of_45() -> Vec<Student> {
    (1..=45u32)
        .map(|id| applicant(id as usize - 1, id, 1, 1, id as f64 / 45.0))
        .collect()
}

#[test]
fn test_grade_weight() {
    // Lower grades weigh more; the whole range stays within (0, 1/5]
    assert_f64_near!(super::grade_weight(1, 3), 0.15);
    assert_f64_near!(super::grade_weight(3, 3), 0.05);
    assert_f64_near!(super::grade_weight(0, 0), 0.2);
    assert!(super::grade_weight(1, 9) > super::grade_weight(2, 9));
}

#[test]
fn test_cohort_follows_into_promoted_class() {
    // Two classmates from former class 7 are promoted into grade 2, where
    // only class 1 is offered. Their old class stays closed.
    let params = test_params();
    let classes = vec![class(1, 1, 2), class(7, 1, 1)];
    let students = vec![enrolled(0, 1, 1, 2, 7), enrolled(1, 2, 1, 2, 7)];

    let allocation = super::solve(&params, &students, &[], &classes)
        .unwrap()
        .expect("the cohort fits into the open class");
    assert_eq!(allocation.enrolled, vec![Some(1), Some(1)]);
    assert_eq!(allocation.opened, vec![true, false]);
}

#[test]
fn test_waitlist_priority_order() {
    // One seat, two applicants: the earlier submission wins
    let mut params = test_params();
    params.qtd_max_alunos = 1;
    let classes = vec![class(1, 1, 1)];
    let students = vec![
        applicant(0, 1, 1, 1, 1.0),
        applicant(1, 2, 1, 1, 0.5),
    ];

    let allocation = super::solve(&params, &[], &students, &classes)
        .unwrap()
        .expect("one applicant fits");
    assert_eq!(allocation.waitlisted, vec![Some(1), None]);
    assert_eq!(allocation.opened, vec![true]);
}

#[test]
fn test_indivisible_cohort_is_infeasible() {
    // A cohort of 31 cannot be split and cannot fit a class of 30
    let params = test_params();
    let classes = vec![class(1, 1, 1)];
    let students: Vec<Student> = (1..=31u32)
        .map(|id| enrolled(id as usize - 1, id, 1, 1, 7))
        .collect();

    let result = super::solve(&params, &students, &[], &classes).unwrap();
    assert!(result.is_none());
}

#[test]
fn test_enrolled_without_candidate_class_is_infeasible() {
    let params = test_params();
    let classes = vec![class(1, 1, 1)];
    let students = vec![enrolled(0, 1, 1, 5, 2)];

    let result = super::solve(&params, &students, &[], &classes).unwrap();
    assert!(result.is_none());
}

#[test]
fn test_all_rooms_open_when_leftover_outweighs_penalty() {
    // 45 applicants at capacity 16 need three rooms; the 13 students left
    // after filling two rooms are worth more than the three empty seats
    let mut params = test_params();
    params.qtd_max_alunos = 16;
    let classes = vec![class(1, 1, 1), class(2, 1, 1), class(3, 1, 1)];
    let students = waitlist_of_45();

    let allocation = super::solve(&params, &[], &students, &classes)
        .unwrap()
        .expect("three rooms cover everyone");
    assert!(allocation.waitlisted.iter().all(|p| p.is_some()));
    assert_eq!(allocation.opened, vec![true, true, true]);
}

#[test]
fn test_seat_penalty_keeps_last_room_shut() {
    // At capacity 20 the five weakest applicants cannot pay for fifteen
    // empty seats, so only two of the three rooms open
    let mut params = test_params();
    params.qtd_max_alunos = 20;
    let classes = vec![class(1, 1, 1), class(2, 1, 1), class(3, 1, 1)];
    let students = waitlist_of_45();

    let allocation = super::solve(&params, &[], &students, &classes)
        .unwrap()
        .expect("two full rooms are feasible");
    let placed = allocation.waitlisted.iter().filter(|p| p.is_some()).count();
    assert_eq!(placed, 40);
    assert_eq!(allocation.opened.iter().filter(|o| **o).count(), 2);
    // The unplaced five are exactly the latest submissions (ids 1..=5)
    for student in students.iter() {
        let expected_placed = student.id > 5;
        assert_eq!(
            allocation.waitlisted[student.index].is_some(),
            expected_placed,
            "applicant {} should{} be placed",
            student.id,
            if expected_placed { "" } else { " not" }
        );
    }
}

#[test]
fn test_budget_limits_open_classes() {
    // Opening a class costs 200 in teachers; the limit of 220 leaves room
    // for one class and at most 20 placed students
    let mut params = test_params();
    params.limite_custo = 220;
    let classes = vec![class(1, 1, 1), class(2, 1, 1)];
    let students: Vec<Student> = (1..=100u32)
        .map(|id| applicant(id as usize - 1, id, 1, 1, id as f64 / 100.0))
        .collect();

    let allocation = super::solve(&params, &[], &students, &classes)
        .unwrap()
        .expect("one class within budget");
    assert_eq!(allocation.opened.iter().filter(|o| **o).count(), 1);
    let placed = allocation.waitlisted.iter().filter(|p| p.is_some()).count();
    assert_eq!(placed, 20);
}

#[test]
fn test_lower_grade_wins_tie() {
    // Budget for a single class, equal-priority applicants in grades 1 and
    // 3: the younger cohort is preferred
    let mut params = test_params();
    params.qtd_max_alunos = 10;
    params.custo_aluno = 0;
    params.limite_custo = 200;
    let classes = vec![class(1, 1, 1), class(2, 1, 3)];
    let mut students = Vec::new();
    for id in 1..=10u32 {
        students.push(applicant(id as usize - 1, id, 1, 1, 0.5));
    }
    for id in 11..=20u32 {
        students.push(applicant(id as usize - 1, id, 1, 3, 0.5));
    }

    let allocation = super::solve(&params, &[], &students, &classes)
        .unwrap()
        .expect("one class fits the budget");
    assert_eq!(allocation.opened, vec![true, false]);
    for student in students.iter() {
        assert_eq!(
            allocation.waitlisted[student.index].is_some(),
            student.new_grade_id == 1
        );
    }
}

#[test]
fn test_large_cohort_moves_together() {
    // Ten classmates exceed the pairwise limit, so the aggregated cohort
    // constraint applies; they still end up in one common class
    let mut params = test_params();
    params.qtd_max_alunos = 10;
    let classes = vec![class(1, 1, 1), class(2, 1, 1)];
    let students: Vec<Student> = (1..=10u32)
        .map(|id| enrolled(id as usize - 1, id, 1, 1, 3))
        .collect();

    let allocation = super::solve(&params, &students, &[], &classes)
        .unwrap()
        .expect("the cohort fits either class");
    let chosen = allocation.enrolled[0].expect("every classmate is placed");
    assert!(allocation.enrolled.iter().all(|p| *p == Some(chosen)));
    assert_eq!(allocation.opened.iter().filter(|o| **o).count(), 1);
}

#[test]
fn test_empty_inputs_solve_trivially() {
    let params = test_params();

    let allocation = super::solve(&params, &[], &[], &[class(1, 1, 1)])
        .unwrap()
        .expect("no students is a feasible allocation");
    assert_eq!(allocation.opened, vec![false]);
    assert_f64_near!(allocation.objective, 0.0);

    let students = vec![applicant(0, 1, 1, 1, 1.0)];
    let allocation = super::solve(&params, &[], &students, &[])
        .unwrap()
        .expect("no candidate classes is a feasible allocation");
    assert_eq!(allocation.waitlisted, vec![None]);
}

#[test]
fn test_objective_grows_with_budget() {
    let classes = vec![class(1, 1, 1), class(2, 1, 1)];
    let students: Vec<Student> = (1..=100u32)
        .map(|id| applicant(id as usize - 1, id, 1, 1, id as f64 / 100.0))
        .collect();

    let mut tight = test_params();
    tight.limite_custo = 220;
    let constrained = super::solve(&tight, &[], &students, &classes)
        .unwrap()
        .expect("one class within budget");

    let mut relaxed = test_params();
    relaxed.limite_custo = 440;
    let generous = super::solve(&relaxed, &[], &students, &classes)
        .unwrap()
        .expect("two classes within budget");

    assert!(generous.objective >= constrained.objective - 1e-9);
}

#[test]
fn test_rerun_is_deterministic() {
    let mut params = test_params();
    params.qtd_max_alunos = 20;
    let classes = vec![class(1, 1, 1), class(2, 1, 1), class(3, 1, 1)];
    let students = waitlist_of_45();

    let first = super::solve(&params, &[], &students, &classes).unwrap();
    let second = super::solve(&params, &[], &students, &classes).unwrap();
    assert_eq!(first, second);
}
