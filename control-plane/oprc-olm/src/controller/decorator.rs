use kube::ResourceExt;
use kube::core::{Expression, ParseExpressionError, Selector};

use crate::crd::GROUP;
use crate::crd::operator::Operator;

/// Longest allowed name segment of a label key.
const MAX_LABEL_NAME_LEN: usize = 63;

#[derive(thiserror::Error, Debug)]
pub enum DecoratorError {
    #[error("operator has no name")]
    MissingName,
    #[error("invalid component selector: {0}")]
    Selector(#[from] ParseExpressionError),
}

/// Read-only conveniences over an [`Operator`].
#[derive(Clone, Copy, Debug)]
pub struct OperatorDecorator<'a> {
    operator: &'a Operator,
}

impl<'a> OperatorDecorator<'a> {
    pub fn new(operator: &'a Operator) -> Result<Self, DecoratorError> {
        if operator.metadata.name.as_deref().unwrap_or_default().is_empty() {
            return Err(DecoratorError::MissingName);
        }
        Ok(Self { operator })
    }

    /// `operators.coreos.com/<name>`, where the name is cut to a valid label
    /// name length and loses trailing separators.
    pub fn component_label_key(&self) -> Result<String, DecoratorError> {
        let name = self.operator.name_any();
        if name.is_empty() {
            return Err(DecoratorError::MissingName);
        }
        let cut = match name.char_indices().nth(MAX_LABEL_NAME_LEN) {
            Some((idx, _)) => &name[..idx],
            None => name.as_str(),
        };
        let trimmed = cut.trim_end_matches(['.', '_', '-']);
        Ok(format!("{GROUP}/{trimmed}"))
    }

    /// Selector of the operator's components: the label selector recorded
    /// in status, or existence of the component label key.
    pub fn component_selector(&self) -> Result<Selector, DecoratorError> {
        let recorded = self
            .operator
            .status
            .as_ref()
            .and_then(|s| s.components.as_ref());
        match recorded {
            Some(components) => {
                Ok(Selector::try_from(components.label_selector.clone())?)
            }
            None => Ok(Expression::Exists(self.component_label_key()?).into()),
        }
    }
}
