mod portfolio_screening;
