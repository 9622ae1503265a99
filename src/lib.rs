//! Allocation engine for an NGO's after-school classes.
//!
//! Each planning cycle the NGO has to decide which classes to open across its
//! partner schools and which students to place in them. Two populations
//! compete for the seats: students already enrolled who want to continue
//! (and must stay together with their current classmates), and applicants
//! from the waiting-list intake form, prioritized by submission date. The
//! engine derives the candidate class offer from demand, builds a
//! mixed-integer program over class-open and student-in-class decisions and
//! extracts the chosen allocation.

pub mod classes;
pub mod io;
pub mod loader;
pub mod milp;

use chrono::NaiveDate;

/// Tag distinguishing the two student populations.
///
/// Student ids are only unique within one source table, so the pair of
/// population tag and id is used as the student key everywhere (solver
/// variable names, constraint names, log output). The variant order matches
/// the lexicographic order of the tags, which fixes the iteration order of
/// the combined population.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Population {
    /// Applicant from the intake form (`formulario`)
    Waitlisted,
    /// Currently enrolled student who wants to continue (`matriculado`)
    Enrolled,
}

impl Population {
    /// Wire/log tag of the population
    pub fn tag(self) -> &'static str {
        match self {
            Population::Waitlisted => "formulario",
            Population::Enrolled => "matriculado",
        }
    }
}

/// Integer tuning parameters of the allocation model, as configured by the
/// NGO in the `parametro` table
#[derive(Clone, Debug)]
pub struct Parameters {
    /// Maximum number of students per class
    pub qtd_max_alunos: u32,
    /// Number of ACD teachers per opened class (cost model only)
    pub qtd_professores_acd: u32,
    /// Number of pedagogical teachers per opened class (cost model only)
    pub qtd_professores_pedagogico: u32,
    /// Cost of one placed student
    pub custo_aluno: i64,
    /// Cost of one teacher
    pub custo_professor: i64,
    /// Upper bound on the total operating cost
    pub limite_custo: i64,
    /// The year being planned for
    pub ano_planejamento: i64,
    /// Keep students in their current grade instead of promoting them
    pub otimiza_dentro_do_ano: bool,
    /// Synthesize new candidate classes from demand instead of reusing the
    /// current class catalog
    pub possibilita_abertura_novas_turmas: bool,
    /// Minimum demand below which no new class is opened for a
    /// (school, grade) pair
    pub min_aluno_por_turma: Option<u32>,
}

/// A student record, ready to be matched against the candidate classes.
///
/// Records are loaded once per run and only mutated by attaching the solved
/// outcome; the two populations are kept in separate, id-ordered sequences
/// because several model constraints apply to only one of them.
#[derive(Clone, Debug)]
pub struct Student {
    /// Position of the student in its population's sequence
    pub index: usize,
    /// The student's id in its source table
    pub id: u32,
    pub population: Population,
    pub school_id: u32,
    /// Grade the student will attend in the planning year, after the
    /// promotion rule has been applied
    pub new_grade_id: u32,
    /// Cohort tag: 0 for waitlisted students, the current class id for
    /// enrolled ones. Enrolled students sharing a cluster must be placed
    /// together.
    pub cluster: u32,
    /// Submission date of the intake form (waitlisted students only)
    pub enrollment_date: Option<NaiveDate>,
    /// Objective weight in (0, 1]: 1 for enrolled students, based on the
    /// descending dense rank of the enrollment date for waitlisted ones
    pub priority_weight: f64,
}

/// A class the optimizer may decide to open, either synthesized from demand
/// or taken from the current class catalog
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateClass {
    /// Id of the class, unique and ascending within the candidate set
    pub class_id: u32,
    pub school_id: u32,
    pub grade_id: u32,
    /// Human-readable name: region name, grade initial and room letter
    pub name: String,
}

/// Result of a successful solve: the chosen class per student (indexed like
/// the input sequences) and the open flag per candidate class
#[derive(Clone, Debug, PartialEq)]
pub struct Allocation {
    /// Class id each enrolled student was placed in
    pub enrolled: Vec<Option<u32>>,
    /// Class id each waitlisted student was placed in, if any
    pub waitlisted: Vec<Option<u32>>,
    /// Open flag per candidate class, in candidate-set order
    pub opened: Vec<bool>,
    /// Objective value reported by the solver
    pub objective: f64,
}

impl Allocation {
    /// Number of students placed in the class with the given id
    pub fn class_size(&self, class_id: u32) -> usize {
        self.enrolled
            .iter()
            .chain(self.waitlisted.iter())
            .filter(|placement| **placement == Some(class_id))
            .count()
    }
}
