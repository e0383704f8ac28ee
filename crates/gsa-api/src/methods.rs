//! The advertised method catalog.
//!
//! Every method declares its parameters with a type, a scope and a
//! default. Global parameters apply to all methods and are prepended to
//! each method's own list.

use serde::{Deserialize, Serialize};

/// Declared value type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Int,
    Float,
    Bool,
    String,
}

/// Where a parameter applies.
///
/// Dataset-scoped parameters given at the analysis level serve as
/// defaults that per-dataset settings override. Common parameters steer
/// system behaviour (reports, e-mail) and never the scientific result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterScope {
    Analysis,
    Dataset,
    Common,
}

/// A parameter declaration in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodParameter {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub data_type: ParameterType,
    pub scope: ParameterScope,
    pub default: String,
    /// Allowed values for enumerated string parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    pub description: String,
}

impl MethodParameter {
    fn new(
        name: &str,
        display_name: &str,
        data_type: ParameterType,
        scope: ParameterScope,
        default: &str,
        description: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            data_type,
            scope,
            default: default.to_string(),
            values: None,
            description: description.to_string(),
        }
    }

    fn with_values(mut self, values: &[&str]) -> Self {
        self.values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    /// Check a submitted value against the declared type and value list
    pub fn check_value(&self, value: &str) -> Result<(), String> {
        match self.data_type {
            ParameterType::Int => {
                value.parse::<i64>().map_err(|_| {
                    format!("Invalid value for '{}': '{}' is not an integer", self.name, value)
                })?;
            }
            ParameterType::Float => {
                value.parse::<f64>().map_err(|_| {
                    format!("Invalid value for '{}': '{}' is not a number", self.name, value)
                })?;
            }
            ParameterType::Bool => {
                if !value.eq_ignore_ascii_case("true") && !value.eq_ignore_ascii_case("false") {
                    return Err(format!(
                        "Invalid value for '{}': '{}' is not a boolean",
                        self.name, value
                    ));
                }
            }
            ParameterType::String => {}
        }

        if let Some(values) = &self.values {
            if !values.iter().any(|allowed| allowed == value) {
                return Err(format!(
                    "Invalid value for '{}': '{}' is not one of [{}]",
                    self.name,
                    value,
                    values.join(", ")
                ));
            }
        }
        Ok(())
    }
}

/// An advertised analysis method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub description: String,
    pub parameters: Vec<MethodParameter>,
}

/// Parameters shared by every method
pub fn global_parameters() -> Vec<MethodParameter> {
    vec![
        MethodParameter::new(
            "use_interactors",
            "Use interactors",
            ParameterType::Bool,
            ParameterScope::Analysis,
            "False",
            "Indicates whether protein-protein interactors should be used to extend the \
             database pathways in the analysis.",
        ),
        MethodParameter::new(
            "include_disease_pathways",
            "Include disease pathways",
            ParameterType::Bool,
            ParameterScope::Analysis,
            "True",
            "Disease pathways may lead to a skewed analysis result and can be excluded.",
        ),
        MethodParameter::new(
            "max_missing_values",
            "Max. missing values",
            ParameterType::Float,
            ParameterScope::Dataset,
            "0.5",
            "The maximum relative number of missing values within one comparison group before \
             a gene / protein is removed from the analysis. Must be between 0-1.",
        ),
        MethodParameter::new(
            "create_reactome_visualization",
            "Create pathway visualizations",
            ParameterType::Bool,
            ParameterScope::Common,
            "True",
            "If set to 'False', no pathway browser visualization is created for the performed \
             analysis.",
        ),
        MethodParameter::new(
            "create_reports",
            "Create reports",
            ParameterType::Bool,
            ParameterScope::Common,
            "False",
            "If set to 'True', additional Microsoft Excel and PDF-based reports of the \
             analysis result will be created.",
        ),
        MethodParameter::new(
            "email",
            "E-Mail",
            ParameterType::String,
            ParameterScope::Common,
            "",
            "If set to a valid e-mail address, links to the analysis result (and report) will \
             be sent once the analysis is complete.",
        ),
        MethodParameter::new(
            "reactome_server",
            "Reactome server",
            ParameterType::String,
            ParameterScope::Common,
            "production",
            "Allows the usage of other pathway database servers. Available options are \
             'production', 'dev', 'release'.",
        )
        .with_values(&["production", "dev", "release"]),
    ]
}

fn norm_function_parameters() -> Vec<MethodParameter> {
    vec![
        MethodParameter::new(
            "discrete_norm_function",
            "Discrete normalisation function",
            ParameterType::String,
            ParameterScope::Dataset,
            "TMM",
            "The normalisation function to use for raw RNA-seq read counts and raw \
             proteomics spectral counts.",
        )
        .with_values(&["TMM", "RLE", "upperquartile", "none"]),
        MethodParameter::new(
            "continuous_norm_function",
            "Continuous normalisation function",
            ParameterType::String,
            ParameterScope::Dataset,
            "none",
            "The normalisation function to use for proteomics intensity data. Normalisation \
             is generally best performed on the peptide level, not the protein level.",
        )
        .with_values(&["none", "scale", "quantile", "cyclicloess"]),
    ]
}

/// All advertised methods, global parameters prepended
pub fn available_methods() -> Vec<Method> {
    let mut padog_parameters = vec![MethodParameter::new(
        "sample_groups",
        "Sample groups",
        ParameterType::String,
        ParameterScope::Dataset,
        "",
        "Name of the sample property holding the sample group for matched-pair analyses \
         (f.e. the same patients before and after therapy). If used, every sample must occur \
         exactly twice, once in each of the analysis groups.",
    )];
    padog_parameters.extend(norm_function_parameters());

    let methods = vec![
        Method {
            name: "PADOG".to_string(),
            description: "Weighted gene set analysis method that down-weighs genes present in \
                          many pathways. Supports multiple omics data sources including \
                          Ribo-seq data."
                .to_string(),
            parameters: padog_parameters,
        },
        Method {
            name: "Camera".to_string(),
            description: "A competitive gene set analysis algorithm similar to the classical \
                          GSEA approach."
                .to_string(),
            parameters: norm_function_parameters(),
        },
        Method {
            name: "ssGSEA".to_string(),
            description: "Single-sample gene set enrichment deriving pathway expression values \
                          for every sample."
                .to_string(),
            parameters: vec![
                MethodParameter::new(
                    "pathways",
                    "Pathways",
                    ParameterType::String,
                    ParameterScope::Analysis,
                    "",
                    "A comma delimited list of pathways to include in the analysis. All other \
                     pathways will be ignored.",
                ),
                MethodParameter::new(
                    "min_size",
                    "Minimum pathway size",
                    ParameterType::Int,
                    ParameterScope::Analysis,
                    "1",
                    "The minimum number of submitted genes mapped to a pathway for the pathway \
                     to be included in the analysis.",
                ),
                MethodParameter::new(
                    "max_size",
                    "Maximum pathway size",
                    ParameterType::Int,
                    ParameterScope::Analysis,
                    "1000",
                    "The maximum number of submitted genes mapped to a pathway for the pathway \
                     to be included in the analysis.",
                ),
            ],
        },
    ];

    methods
        .into_iter()
        .map(|mut method| {
            let mut parameters = global_parameters();
            parameters.append(&mut method.parameters);
            method.parameters = parameters;
            method
        })
        .collect()
}

/// Parameters declared for the named method (case-insensitive), or `None`
/// if no such method exists.
pub fn parameters_for_method(method_name: &str) -> Option<Vec<MethodParameter>> {
    let wanted = method_name.trim().to_lowercase();
    available_methods()
        .into_iter()
        .find(|method| method.name.to_lowercase() == wanted)
        .map(|method| method.parameters)
}
