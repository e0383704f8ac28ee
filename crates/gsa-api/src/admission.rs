//! Request admission: body decoding, parameter normalization and
//! cross-field validation.
//!
//! Nothing invalid is ever enqueued. Shape errors map to 400, an unknown
//! method to 404 and internally inconsistent requests to 406.

use axum::http::{header, HeaderMap};
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::io::Read;

use gsa_common::blackboard::{keys, Blackboard, BlackboardRef};
use gsa_common::matrix::ExpressionMatrix;
use gsa_common::models::{AnalysisInput, DataType, Parameter};

use crate::catalog::Catalog;
use crate::error::{ApiError, ApiResult};
use crate::methods::{MethodParameter, ParameterScope};

/// Decode the request body, accepting plain or gzip-compressed JSON
pub fn decode_body(headers: &HeaderMap, body: &[u8]) -> ApiResult<AnalysisInput> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/json");

    let text = if content_type.contains("gzip") {
        tracing::debug!("Received gzip-compressed analysis request, decompressing");
        let mut decoded = String::new();
        GzDecoder::new(body)
            .read_to_string(&mut decoded)
            .map_err(|_| {
                ApiError::BadRequest("Request body is not valid gzip data".to_string())
            })?;
        decoded
    } else {
        String::from_utf8(body.to_vec())
            .map_err(|_| ApiError::BadRequest("Request body is not valid UTF-8".to_string()))?
    };

    serde_json::from_str(&text)
        .map_err(|e| ApiError::BadRequest(format!("Invalid analysis request: {}", e)))
}

/// Normalize the parameter lists against the method catalog.
///
/// Submitted values are checked against their declaration (invalid values
/// fail closed with 406, unknown names are dropped with a warning),
/// missing parameters receive their defaults, and dataset-scoped values
/// set at the analysis level become per-dataset defaults.
pub fn normalize_parameters(input: &mut AnalysisInput, catalog: &Catalog) -> ApiResult<()> {
    let method = catalog
        .method(&input.method_name)
        .ok_or_else(|| ApiError::NotFound("Unknown analysis method selected.".to_string()))?;
    let declared = &method.parameters;

    let mut provided = checked_values(&input.parameters, declared, "analysis")?;

    let mut resolved = Vec::with_capacity(declared.len());
    for declaration in declared {
        let value = provided
            .remove(&declaration.name)
            .unwrap_or_else(|| declaration.default.clone());
        resolved.push(Parameter::new(&declaration.name, value));
    }
    input.parameters = resolved;

    let dataset_declarations: Vec<MethodParameter> = declared
        .iter()
        .filter(|declaration| declaration.scope == ParameterScope::Dataset)
        .cloned()
        .collect();

    for dataset in &mut input.datasets {
        let mut provided =
            checked_values(&dataset.parameters, &dataset_declarations, &dataset.name)?;

        let mut resolved = Vec::with_capacity(dataset_declarations.len());
        for declaration in &dataset_declarations {
            // The analysis-level value (already defaulted) is the
            // per-dataset default
            let analysis_value = input
                .parameters
                .iter()
                .find(|p| p.name == declaration.name)
                .map(|p| p.value.clone())
                .unwrap_or_else(|| declaration.default.clone());
            let value = provided.remove(&declaration.name).unwrap_or(analysis_value);
            resolved.push(Parameter::new(&declaration.name, value));
        }
        dataset.parameters = resolved;
    }

    Ok(())
}

/// Collect submitted values into a map, validating each against its
/// declaration. Unknown names are dropped with a warning.
fn checked_values(
    submitted: &[Parameter],
    declared: &[MethodParameter],
    context: &str,
) -> ApiResult<HashMap<String, String>> {
    let mut values = HashMap::new();
    for parameter in submitted {
        match declared.iter().find(|d| d.name == parameter.name) {
            Some(declaration) => {
                declaration
                    .check_value(&parameter.value)
                    .map_err(ApiError::NotAcceptable)?;
                values.insert(parameter.name.clone(), parameter.value.clone());
            }
            None => {
                tracing::warn!(
                    parameter = %parameter.name,
                    context,
                    "Ignoring unknown parameter"
                );
            }
        }
    }
    Ok(values)
}

/// Whether a data field is a storage token rather than an inline matrix
fn is_storage_token(data: &str) -> bool {
    data.starts_with("dst_") || data.len() < 20
}

/// Replace storage tokens with the previously loaded matrix data
pub async fn resolve_data_tokens(
    board: &BlackboardRef,
    input: &mut AnalysisInput,
) -> ApiResult<()> {
    for dataset in &mut input.datasets {
        if !is_storage_token(&dataset.data) {
            continue;
        }

        let token = dataset.data.clone();
        match board.get(&keys::dataset_data(&token)).await? {
            Some(stored) => {
                dataset.data = String::from_utf8(stored).map_err(|_| {
                    ApiError::Internal(format!("Stored data for token '{}' is not UTF-8", token))
                })?;
            }
            None => {
                return Err(ApiError::BadRequest(format!(
                    "No data available for storage token '{}'",
                    token
                )));
            }
        }
    }
    Ok(())
}

/// Cross-field validation of the normalized request
pub fn validate_datasets(input: &AnalysisInput) -> ApiResult<()> {
    if input.datasets.is_empty() {
        return Err(ApiError::NotAcceptable(
            "Request does not contain any datasets".to_string(),
        ));
    }

    let mut names = std::collections::HashSet::new();
    for dataset in &input.datasets {
        if !names.insert(dataset.name.as_str()) {
            return Err(ApiError::NotAcceptable(
                "Datasets must not have duplicate names".to_string(),
            ));
        }
    }

    for dataset in &input.datasets {
        let design = dataset.design.as_ref().ok_or_else(|| {
            ApiError::NotAcceptable(format!(
                "Invalid request. Dataset '{}' misses the required experimental design.",
                dataset.name
            ))
        })?;

        if design.samples.is_empty() {
            return Err(ApiError::NotAcceptable(format!(
                "Invalid request. Dataset '{}' declares no samples.",
                dataset.name
            )));
        }

        if design.samples.len() != design.analysis_group.len() {
            return Err(ApiError::NotAcceptable(format!(
                "Invalid request. Dataset '{}': 'analysisGroup' must assign one group per sample.",
                dataset.name
            )));
        }

        for group in [&design.comparison.group1, &design.comparison.group2] {
            if !design.analysis_group.iter().any(|g| g == group) {
                return Err(ApiError::NotAcceptable(format!(
                    "Invalid request. Dataset '{}': comparison group '{}' does not occur in \
                     'analysisGroup'.",
                    dataset.name, group
                )));
            }
        }

        for (name, values) in &design.covariates {
            if values.len() != design.samples.len() {
                return Err(ApiError::NotAcceptable(format!(
                    "Invalid request. Dataset '{}': property '{}' has {} values for {} samples.",
                    dataset.name,
                    name,
                    values.len(),
                    design.samples.len()
                )));
            }
        }

        let matrix = ExpressionMatrix::parse(&dataset.data).map_err(|err| {
            ApiError::BadRequest(format!(
                "Failed to convert dataset '{}': {}",
                dataset.name, err
            ))
        })?;

        // Ribo-seq matrices carry the RNA and Ribo column blocks
        let expected_columns = match dataset.data_type {
            DataType::RiboSeq => design.samples.len() * 2,
            _ => design.samples.len(),
        };
        if matrix.n_samples() != expected_columns {
            return Err(ApiError::NotAcceptable(format!(
                "Invalid request. Dataset '{}': the experimental design describes {} samples \
                 but the expression matrix contains {} columns.",
                dataset.name,
                expected_columns,
                matrix.n_samples()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use gsa_common::blackboard::{Blackboard, MemoryBlackboard};
    use gsa_common::models::{Comparison, Design};
    use std::io::Write;
    use std::sync::Arc;

    fn request_json() -> String {
        serde_json::json!({
            "methodName": "Camera",
            "datasets": [{
                "name": "rnaseq",
                "type": "rnaseq_counts",
                "data": "\tS1\tS2\tS3\tS4\nCD19\t10\t20\t5\t8\nMITF\t0\t4\t21\t3\nTP53\t2\t7\t9\t1",
                "design": {
                    "samples": ["S1", "S2", "S3", "S4"],
                    "comparison": {"group1": "tumor", "group2": "control"},
                    "analysisGroup": ["tumor", "tumor", "control", "control"]
                }
            }],
            "parameters": [{"name": "discrete_norm_function", "value": "RLE"}]
        })
        .to_string()
    }

    fn decode(json: &str) -> AnalysisInput {
        decode_body(&HeaderMap::new(), json.as_bytes()).unwrap()
    }

    #[test]
    fn test_gzip_and_plain_bodies_decode_identically() {
        let json = request_json();
        let plain = decode_body(&HeaderMap::new(), json.as_bytes()).unwrap();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(json.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/gzip".parse().unwrap());
        let gzipped = decode_body(&headers, &compressed).unwrap();

        assert_eq!(plain, gzipped);
    }

    #[test]
    fn test_malformed_body_is_bad_request() {
        let err = decode_body(&HeaderMap::new(), b"not json").unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = decode_body(&HeaderMap::new(), br#"{"methodName": 7}"#).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_unknown_method_is_not_found() {
        let catalog = Catalog::load(None);
        let mut input = decode(&request_json());
        input.method_name = "MagicGSA".to_string();

        let err = normalize_parameters(&mut input, &catalog).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_parameters_receive_defaults() {
        let catalog = Catalog::load(None);
        let mut input = decode(&request_json());
        normalize_parameters(&mut input, &catalog).unwrap();

        // The submitted value survives
        assert_eq!(input.parameter("discrete_norm_function"), Some("RLE"));
        // Unset declared parameters get their defaults
        assert_eq!(input.parameter("max_missing_values"), Some("0.5"));
        assert_eq!(input.parameter("create_reports"), Some("False"));

        // The dataset inherits the analysis-level value as default
        assert_eq!(
            input.datasets[0].parameter("discrete_norm_function"),
            Some("RLE")
        );
    }

    #[test]
    fn test_dataset_parameter_overrides_analysis_default() {
        let catalog = Catalog::load(None);
        let mut input = decode(&request_json());
        input.datasets[0].parameters = vec![Parameter::new("discrete_norm_function", "none")];
        normalize_parameters(&mut input, &catalog).unwrap();

        assert_eq!(input.parameter("discrete_norm_function"), Some("RLE"));
        assert_eq!(
            input.datasets[0].parameter("discrete_norm_function"),
            Some("none")
        );
    }

    #[test]
    fn test_invalid_enum_value_fails_closed() {
        let catalog = Catalog::load(None);
        let mut input = decode(&request_json());
        input.parameters = vec![Parameter::new("discrete_norm_function", "median")];

        let err = normalize_parameters(&mut input, &catalog).unwrap_err();
        assert!(matches!(err, ApiError::NotAcceptable(_)));
    }

    #[test]
    fn test_unknown_parameter_is_dropped() {
        let catalog = Catalog::load(None);
        let mut input = decode(&request_json());
        input.parameters.push(Parameter::new("turbo_mode", "on"));
        normalize_parameters(&mut input, &catalog).unwrap();

        assert_eq!(input.parameter("turbo_mode"), None);
    }

    #[test]
    fn test_valid_request_passes_validation() {
        let input = decode(&request_json());
        validate_datasets(&input).unwrap();
    }

    #[test]
    fn test_duplicate_dataset_names_rejected() {
        let mut input = decode(&request_json());
        let copy = input.datasets[0].clone();
        input.datasets.push(copy);

        let err = validate_datasets(&input).unwrap_err();
        assert!(matches!(err, ApiError::NotAcceptable(_)));
    }

    #[test]
    fn test_missing_design_rejected() {
        let mut input = decode(&request_json());
        input.datasets[0].design = None;

        let err = validate_datasets(&input).unwrap_err();
        assert!(err.to_string().contains("experimental design"));
    }

    #[test]
    fn test_sample_count_mismatch_rejected() {
        let mut input = decode(&request_json());
        let design = input.datasets[0].design.as_mut().unwrap();
        design.samples.pop();
        design.analysis_group.pop();

        let err = validate_datasets(&input).unwrap_err();
        assert!(matches!(err, ApiError::NotAcceptable(_)));
        assert!(err.to_string().contains("columns"));
    }

    #[test]
    fn test_comparison_group_must_occur() {
        let mut input = decode(&request_json());
        input.datasets[0].design.as_mut().unwrap().comparison = Comparison {
            group1: "treated".to_string(),
            group2: "control".to_string(),
        };

        let err = validate_datasets(&input).unwrap_err();
        assert!(err.to_string().contains("treated"));
    }

    #[test]
    fn test_covariate_arity_checked() {
        let mut input = decode(&request_json());
        input.datasets[0]
            .design
            .as_mut()
            .unwrap()
            .covariates
            .insert("patient".to_string(), vec!["p1".to_string()]);

        let err = validate_datasets(&input).unwrap_err();
        assert!(err.to_string().contains("patient"));
    }

    #[test]
    fn test_malformed_matrix_is_bad_request() {
        let mut input = decode(&request_json());
        input.datasets[0].data = "\tS1\tS2\tS3\tS4\nCD19\t1\t2\tthree\t4".to_string();

        let err = validate_datasets(&input).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_storage_token_resolution() {
        let board: BlackboardRef = Arc::new(MemoryBlackboard::new());
        board
            .put(
                &keys::dataset_data("dst_0123456789ab"),
                b"\tS1\tS2\tS3\tS4\nCD19\t1\t2\t3\t4",
                None,
            )
            .await
            .unwrap();

        let mut input = decode(&request_json());
        input.datasets[0].data = "dst_0123456789ab".to_string();
        resolve_data_tokens(&board, &mut input).await.unwrap();
        assert!(input.datasets[0].data.contains("CD19"));

        let mut missing = decode(&request_json());
        missing.datasets[0].data = "dst_missing00000".to_string();
        let err = resolve_data_tokens(&board, &mut missing).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_ribo_seq_expects_doubled_columns() {
        let mut input = decode(&request_json());
        let dataset = &mut input.datasets[0];
        dataset.data_type = DataType::RiboSeq;
        dataset.design = Some(Design {
            samples: vec!["S1".to_string(), "S2".to_string()],
            comparison: Comparison {
                group1: "tumor".to_string(),
                group2: "control".to_string(),
            },
            analysis_group: vec!["tumor".to_string(), "control".to_string()],
            covariates: Default::default(),
        });

        // Four columns for two samples: RNA block plus Ribo block
        dataset.data =
            "\tS1_rna\tS2_rna\tS1_ribo\tS2_ribo\nCD19\t1\t2\t3\t4\nMITF\t5\t6\t7\t8".to_string();
        validate_datasets(&input).unwrap();

        // A plain two-column matrix no longer matches
        input.datasets[0].data = "\tS1\tS2\nCD19\t1\t2".to_string();
        assert!(validate_datasets(&input).is_err());
    }

    #[test]
    fn test_storage_token_detection() {
        assert!(is_storage_token("dst_0123456789ab"));
        assert!(is_storage_token("shorttoken"));
        assert!(!is_storage_token("\tS1\tS2\nGENE1\t1\t2\nGENE2\t3\t4"));
    }

    #[test]
    fn test_request_without_datasets_rejected() {
        let mut input = decode(&request_json());
        input.datasets.clear();
        assert!(validate_datasets(&input).is_err());
    }
}
