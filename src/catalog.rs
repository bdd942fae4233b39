use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

const BUILTIN_MODULES: &[(&str, &[(&str, u32)])] = &[
    (
        "Módulo 1: Fundamentos",
        &[
            ("Scratch", 20),
            ("No Code", 36),
            ("Introdução a Web", 47),
            ("Linux", 38),
            ("Programação Básica com Python", 59),
        ],
    ),
    (
        "Módulo 2: Backend e Dados",
        &[
            ("JavaScript", 35),
            ("Programação Orientada a Objetos", 39),
            ("Programação Intermediária com Python - Python II", 42),
            ("Banco de Dados Relacional", 35),
        ],
    ),
    (
        "Módulo 3: Frontend e Mobile",
        &[
            ("Fundamentos de Interface", 33),
            ("Desenvolvimento de websites com mentalidade ágil", 34),
            ("Desenvolvimento de Interfaces Web Frameworks Front-End", 36),
            ("React JS", 36),
            ("Programação Multiplataforma com React Native", 36),
            ("Programação Multiplataforma com Flutter", 39),
        ],
    ),
    (
        "Módulo 4: Avançado e Ferramentas",
        &[
            ("Padrão de Projeto de Software", 20),
            ("Desenvolvimento Nativo para Android", 20),
            ("Desenvolvimento de APIs RESTful", 20),
            ("Teste de Software Para Web", 22),
        ],
    ),
    (
        "Projetos e Outros",
        &[("Projetos II", 16), ("Tutorial Plataforma", 4)],
    ),
];

const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("Banco de Dados", "Banco de Dados Relacional"),
    (
        "Programação Intermediária com Python",
        "Programação Intermediária com Python - Python II",
    ),
];

const BUILTIN_EXCLUDED_AGENTS: &[&str] = &[
    "gabrielrodrigues@projetodesenvolve.com.br",
    "lucca@projetodesenvolve.com.br",
    "esther@projetodesenvolve.com.br",
    "leandraramos@projetodesenvolve.com.br",
    "lorenzolima@projetodesenvolve.com.br",
    "gustavo.viera@projetodesenvolve.com.br",
    "emannuelcosta@projetodesenvolve.com.br",
    "jhulybastos@projetodesenvolve.com.br",
    "larissafelipe@projetodesenvolve.com.br",
    "gustavo.vieira@projetodesenvolve.com.br",
];

const BUILTIN_GRADE_FILES: &[(&str, &str)] =
    &[("Scratch", "course-v1_ProjetoDesenvolve+Scratch1+01.csv")];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discipline {
    pub key: String,
    pub total_lessons: u32,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    pub name: String,
    /// Discipline keys in curriculum order.
    pub disciplines: Vec<String>,
}

/// Named set of email suffixes identifying one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSet {
    pub name: String,
    suffixes: Vec<String>,
}

impl DomainSet {
    pub fn new(
        name: impl Into<String>,
        suffixes: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            name: name.into(),
            suffixes: suffixes
                .into_iter()
                .map(|suffix| suffix.as_ref().trim().to_lowercase())
                .filter(|suffix| !suffix.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.suffixes.iter().any(|suffix| email.ends_with(suffix.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    disciplines: Vec<Discipline>,
    positions: HashMap<String, usize>,
    modules: Vec<Module>,
    aliases: HashMap<String, String>,
    excluded_agents: BTreeSet<String>,
    domain_sets: BTreeMap<String, DomainSet>,
    grade_files: BTreeMap<String, String>,
}

impl Catalog {
    /// Builds a catalog from ordered modules of `(discipline, total_lessons)`.
    pub fn new<M, D>(modules: M) -> Self
    where
        M: IntoIterator<Item = (String, D)>,
        D: IntoIterator<Item = (String, u32)>,
    {
        let mut catalog = Catalog::default();

        for (module_name, members) in modules {
            let mut keys = Vec::new();
            for (key, total_lessons) in members {
                if catalog.positions.contains_key(&key) {
                    tracing::warn!(
                        discipline = %key,
                        "discipline listed in more than one module, keeping first"
                    );
                    continue;
                }
                catalog.positions.insert(key.clone(), catalog.disciplines.len());
                catalog.disciplines.push(Discipline {
                    key: key.clone(),
                    total_lessons,
                    module: module_name.clone(),
                });
                keys.push(key);
            }
            catalog.modules.push(Module {
                name: module_name,
                disciplines: keys,
            });
        }

        catalog
    }

    /// The production course catalog.
    pub fn builtin() -> Self {
        let modules = BUILTIN_MODULES.iter().map(|(name, members)| {
            (
                name.to_string(),
                members
                    .iter()
                    .map(|(key, total)| (key.to_string(), *total))
                    .collect::<Vec<_>>(),
            )
        });

        let mut catalog = Catalog::new(modules);
        for (raw, canonical) in BUILTIN_ALIASES {
            catalog = catalog.with_alias(*raw, *canonical);
        }
        for agent in BUILTIN_EXCLUDED_AGENTS {
            catalog = catalog.with_excluded_agent(*agent);
        }
        for (discipline, file) in BUILTIN_GRADE_FILES {
            catalog = catalog.with_grade_file(*discipline, *file);
        }
        catalog
    }

    pub fn with_alias(mut self, raw: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases.insert(raw.into(), canonical.into());
        self
    }

    pub fn with_excluded_agent(mut self, email: impl AsRef<str>) -> Self {
        let email = email.as_ref().trim().to_lowercase();
        if !email.is_empty() {
            self.excluded_agents.insert(email);
        }
        self
    }

    pub fn with_domain_set(mut self, set: DomainSet) -> Self {
        self.domain_sets.insert(set.name.clone(), set);
        self
    }

    pub fn with_grade_file(
        mut self,
        discipline: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        self.grade_files.insert(discipline.into(), file.into());
        self
    }

    /// Maps a raw discipline name to its canonical key. Names without an
    /// alias are already canonical and come back unchanged.
    pub fn normalize<'a>(&'a self, raw: &'a str) -> &'a str {
        self.aliases.get(raw).map(String::as_str).unwrap_or(raw)
    }

    pub fn disciplines(&self) -> &[Discipline] {
        &self.disciplines
    }

    pub fn discipline(&self, key: &str) -> Option<&Discipline> {
        self.positions.get(key).map(|&index| &self.disciplines[index])
    }

    /// Lesson total for a canonical key; unknown disciplines have none.
    pub fn total_lessons(&self, key: &str) -> u32 {
        self.discipline(key).map(|d| d.total_lessons).unwrap_or(0)
    }

    /// Catalog order of a discipline, used to sort report rows.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module_of(&self, key: &str) -> Option<&Module> {
        let discipline = self.discipline(key)?;
        self.modules.iter().find(|m| m.name == discipline.module)
    }

    pub fn is_excluded_agent(&self, email: &str) -> bool {
        self.excluded_agents.contains(&email.trim().to_lowercase())
    }

    pub fn domain_set(&self, name: &str) -> Option<&DomainSet> {
        self.domain_sets.get(name)
    }

    pub fn domain_set_names(&self) -> impl Iterator<Item = &str> {
        self.domain_sets.keys().map(String::as_str)
    }

    /// `(discipline, file name)` pairs for per-discipline grade exports.
    pub fn grade_files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.grade_files
            .iter()
            .map(|(discipline, file)| (discipline.as_str(), file.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_map_to_canonical_keys() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.normalize("Banco de Dados"), "Banco de Dados Relacional");
        assert_eq!(
            catalog.normalize("Programação Intermediária com Python"),
            "Programação Intermediária com Python - Python II"
        );
    }

    #[test]
    fn unmapped_names_pass_through() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.normalize("Linux"), "Linux");
        assert_eq!(catalog.normalize("Curso Desconhecido"), "Curso Desconhecido");
        assert_eq!(catalog.total_lessons("Curso Desconhecido"), 0);
    }

    #[test]
    fn builtin_modules_keep_curriculum_order() {
        let catalog = Catalog::builtin();
        let names: Vec<&str> = catalog.modules().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names.len(), 5);
        assert_eq!(names[0], "Módulo 1: Fundamentos");
        assert_eq!(names[4], "Projetos e Outros");
        assert_eq!(catalog.disciplines().len(), 21);
        assert_eq!(catalog.total_lessons("Banco de Dados Relacional"), 35);
        assert_eq!(
            catalog.module_of("React JS").map(|m| m.name.as_str()),
            Some("Módulo 3: Frontend e Mobile")
        );
        assert!(catalog.position("Scratch") < catalog.position("JavaScript"));
    }

    #[test]
    fn excluded_agents_match_case_insensitively() {
        let catalog = Catalog::builtin().with_excluded_agent("AgentX@Example.com");
        assert!(catalog.is_excluded_agent("agentx@example.com"));
        assert!(catalog.is_excluded_agent(" LUCCA@projetodesenvolve.com.br"));
        assert!(!catalog.is_excluded_agent("someone@example.com"));
    }

    #[test]
    fn domain_sets_match_by_suffix() {
        let set = DomainSet::new("pd", ["@projetodesenvolve.com.br", " "]);
        assert!(set.matches("Aluno@ProjetoDesenvolve.com.br"));
        assert!(!set.matches("aluno@gmail.com"));

        let catalog = Catalog::builtin().with_domain_set(set);
        assert!(catalog.domain_set("pd").is_some());
        assert_eq!(catalog.domain_set_names().collect::<Vec<_>>(), vec!["pd"]);
    }

    #[test]
    fn duplicate_disciplines_keep_first_module() {
        let catalog = Catalog::new(vec![
            ("A".to_string(), vec![("X".to_string(), 3)]),
            ("B".to_string(), vec![("X".to_string(), 9), ("Y".to_string(), 2)]),
        ]);
        assert_eq!(catalog.total_lessons("X"), 3);
        assert_eq!(catalog.modules()[1].disciplines, vec!["Y".to_string()]);
    }
}
