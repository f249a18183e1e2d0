//! Loading of externally authored templates.
//!
//! JSON templates are read as-is. YAML templates may use the short-form
//! intrinsic tags (`!Ref`, `!GetAtt`, `!Sub`, ...), which are expanded to
//! their long forms so the rest of the pipeline only ever sees JSON.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Number, Value};
use serde_yaml::value::TaggedValue;

use crate::error::{IacError, IacResult};

const FN_TAGS: [&str; 15] = [
    "Base64",
    "Cidr",
    "FindInMap",
    "GetAZs",
    "ImportValue",
    "Join",
    "Select",
    "Split",
    "Sub",
    "Transform",
    "If",
    "Equals",
    "Not",
    "And",
    "Or",
];

/// A parsed template document.
#[derive(Debug, Clone, PartialEq)]
pub struct CfnTemplate {
    path: PathBuf,
    body: Map<String, Value>,
}

impl CfnTemplate {
    /// Load a template from disk. `.json` files are parsed as JSON,
    /// everything else as YAML.
    pub fn load(path: &Path) -> IacResult<Self> {
        if !path.exists() {
            return Err(IacError::TemplateNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let body = if is_json {
            serde_json::from_str::<Value>(&content).map_err(|e| invalid(path, e.to_string()))?
        } else {
            let yaml: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|e| invalid(path, e.to_string()))?;
            yaml_to_json(path, yaml)?
        };

        Self::from_value(path, body)
    }

    /// Wrap an already parsed document.
    pub fn from_value(path: &Path, body: Value) -> IacResult<Self> {
        let body = match body {
            Value::Object(map) => map,
            _ => return Err(invalid(path, "template must be a mapping")),
        };

        match body.get("Resources") {
            Some(Value::Object(_)) => {}
            _ => return Err(invalid(path, "template has no Resources mapping")),
        }

        Ok(Self {
            path: path.to_path_buf(),
            body,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Entries of a mapping section, empty when the section is absent.
    pub fn section(&self, name: &str) -> Map<String, Value> {
        self.body
            .get(name)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    pub fn parameters(&self) -> Map<String, Value> {
        self.section("Parameters")
    }

    pub fn resources(&self) -> Map<String, Value> {
        self.section("Resources")
    }

    pub fn outputs(&self) -> Map<String, Value> {
        self.section("Outputs")
    }

    /// Set the `Default` of a declared parameter.
    pub fn set_parameter_default(&mut self, key: &str, value: Value) -> IacResult<()> {
        let parameter = self
            .body
            .get_mut("Parameters")
            .and_then(Value::as_object_mut)
            .and_then(|params| params.get_mut(key))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| IacError::UnknownTemplateParameter {
                path: self.path.clone(),
                key: key.to_string(),
            })?;

        parameter.insert("Default".to_string(), value);
        Ok(())
    }
}

fn invalid(path: &Path, message: impl Into<String>) -> IacError {
    IacError::InvalidTemplate {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Convert a YAML document to JSON, expanding intrinsic tags.
pub fn yaml_to_json(path: &Path, value: serde_yaml::Value) -> IacResult<Value> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| invalid(path, format!("number {} cannot be represented", n)))?
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(|item| yaml_to_json(path, item))
                .collect::<IacResult<Vec<_>>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    other => return Err(invalid(path, format!("unsupported mapping key {:?}", other))),
                };
                map.insert(key, yaml_to_json(path, value)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => expand_tag(path, *tagged)?,
    })
}

fn expand_tag(path: &Path, tagged: TaggedValue) -> IacResult<Value> {
    let tag = tagged.tag.to_string();
    let tag = tag.trim_start_matches('!');
    let inner = yaml_to_json(path, tagged.value)?;

    let mut wrapped = Map::new();
    match tag {
        "Ref" | "Condition" => {
            wrapped.insert(tag.to_string(), inner);
        }
        "GetAtt" => {
            let args = match inner {
                Value::String(s) => match s.split_once('.') {
                    Some((resource, attribute)) => {
                        Value::Array(vec![Value::String(resource.to_string()), Value::String(attribute.to_string())])
                    }
                    None => return Err(invalid(path, format!("!GetAtt {} needs resource.attribute", s))),
                },
                other => other,
            };
            wrapped.insert("Fn::GetAtt".to_string(), args);
        }
        t if FN_TAGS.iter().any(|known| *known == t) => {
            wrapped.insert(format!("Fn::{}", t), inner);
        }
        other => return Err(invalid(path, format!("unknown tag !{}", other))),
    }
    Ok(Value::Object(wrapped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn convert(yaml: &str) -> Value {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        yaml_to_json(Path::new("t.yaml"), value).unwrap()
    }

    #[test]
    fn test_short_form_tags() {
        let value = convert(
            r#"
Bucket: !Ref MyBucket
Arn: !GetAtt MyBucket.Arn
Name: !Sub "${AWS::StackName}-bucket"
Joined: !Join [ "-", [ a, b ] ]
Zone: !Select [ 0, !GetAZs "" ]
"#,
        );
        assert_eq!(value["Bucket"], json!({"Ref": "MyBucket"}));
        assert_eq!(value["Arn"], json!({"Fn::GetAtt": ["MyBucket", "Arn"]}));
        assert_eq!(value["Name"], json!({"Fn::Sub": "${AWS::StackName}-bucket"}));
        assert_eq!(value["Joined"], json!({"Fn::Join": ["-", ["a", "b"]]}));
        assert_eq!(value["Zone"], json!({"Fn::Select": [0, {"Fn::GetAZs": ""}]}));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let value: serde_yaml::Value = serde_yaml::from_str("A: !Bogus x").unwrap();
        let err = yaml_to_json(Path::new("t.yaml"), value).unwrap_err();
        assert!(matches!(err, IacError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_template_requires_resources() {
        let err = CfnTemplate::from_value(Path::new("t.json"), json!({"Parameters": {}})).unwrap_err();
        assert!(matches!(err, IacError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_set_parameter_default() {
        let mut template = CfnTemplate::from_value(
            Path::new("t.json"),
            json!({"Parameters": {"Env": {"Type": "String"}}, "Resources": {}}),
        )
        .unwrap();

        template.set_parameter_default("Env", json!("prod")).unwrap();
        assert_eq!(template.parameters()["Env"]["Default"], json!("prod"));

        let err = template.set_parameter_default("Missing", json!("x")).unwrap_err();
        assert!(matches!(err, IacError::UnknownTemplateParameter { ref key, .. } if key == "Missing"));
    }
}
